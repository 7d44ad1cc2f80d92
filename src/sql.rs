use std::collections::BTreeMap;

use chrono::NaiveDate;
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::engine::{BookingFilter, QueryParts};
use crate::limits::MAX_TEXT_LEN;
use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertHall {
        code: ResourceId,
        capacity: Option<u32>,
    },
    DeleteHall {
        code: ResourceId,
    },
    InsertBooking {
        request: BookingRequest,
    },
    ApproveBooking {
        id: Ulid,
    },
    RejectBooking {
        id: Ulid,
        reason: Option<String>,
    },
    DeleteBooking {
        id: Ulid,
    },
    SelectHalls,
    SelectBookings {
        filter: BookingFilter,
    },
    /// Raw fields; missing or malformed ones become an `invalid` verdict, not a SQL error.
    SelectAvailability {
        parts: QueryParts,
    },
    SelectDayView {
        date: NaiveDate,
    },
    SelectHallOverview {
        date: NaiveDate,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

const HALL_COLUMNS: &[&str] = &["code", "capacity"];
const BOOKING_COLUMNS: &[&str] = &[
    "id",
    "hall",
    "date",
    "start_time",
    "end_time",
    "event_title",
    "faculty_name",
    "faculty_department",
    "faculty_designation",
    "faculty_email",
    "event_description",
];
const APPROVAL_COLUMNS: &[&str] = &["booking_id"];
const REJECTION_COLUMNS: &[&str] = &["booking_id", "reason"];

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "halls" => {
            let row = arrange_row(insert, "halls", HALL_COLUMNS, 1, &values)?;
            let code = ResourceId::new(parse_string(required(&row, HALL_COLUMNS, 0)?)?);
            let capacity = match row[1] {
                Some(v) => parse_u32_or_null(v)?,
                None => None,
            };
            Ok(Command::InsertHall { code, capacity })
        }
        "bookings" => {
            let row = arrange_row(insert, "bookings", BOOKING_COLUMNS, 7, &values)?;
            let field = |idx| required(&row, BOOKING_COLUMNS, idx);
            let id = match row[0] {
                Some(v) => parse_ulid_or_null(v)?,
                None => None,
            };
            let request = BookingRequest {
                id: id.unwrap_or_else(Ulid::new),
                resource_id: ResourceId::new(parse_string(field(1)?)?),
                date: parse_date_expr(field(2)?)?,
                start_time: parse_time_expr(field(3)?, "start_time")?,
                end_time: parse_time_expr(field(4)?, "end_time")?,
                details: BookingDetails {
                    event_title: parse_string(field(5)?)?,
                    faculty_name: parse_string(field(6)?)?,
                    faculty_department: optional_string(row[7])?,
                    faculty_designation: optional_string(row[8])?,
                    faculty_email: optional_string(row[9])?,
                    event_description: optional_string(row[10])?,
                },
            };
            Ok(Command::InsertBooking { request })
        }
        "approvals" => {
            let row = arrange_row(insert, "approvals", APPROVAL_COLUMNS, 1, &values)?;
            Ok(Command::ApproveBooking {
                id: parse_ulid(required(&row, APPROVAL_COLUMNS, 0)?)?,
            })
        }
        "rejections" => {
            let row = arrange_row(insert, "rejections", REJECTION_COLUMNS, 1, &values)?;
            let reason = optional_string(row[1])?;
            if let Some(r) = &reason
                && r.len() > MAX_TEXT_LEN
            {
                return Err(SqlError::Parse("rejection reason too long".into()));
            }
            Ok(Command::RejectBooking {
                id: parse_ulid(required(&row, REJECTION_COLUMNS, 0)?)?,
                reason,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Line the VALUES row up with `columns`: by name when the INSERT lists its
/// columns, by position otherwise. Columns given no value come back as `None`.
fn arrange_row<'a>(
    insert: &ast::Insert,
    table: &'static str,
    columns: &[&'static str],
    positional_min: usize,
    values: &'a [Expr],
) -> Result<Vec<Option<&'a Expr>>, SqlError> {
    if insert.columns.is_empty() {
        if values.len() < positional_min {
            return Err(SqlError::WrongArity(table, positional_min, values.len()));
        }
        if values.len() > columns.len() {
            return Err(SqlError::Parse(format!(
                "{table}: expected at most {} values, got {}",
                columns.len(),
                values.len()
            )));
        }
        let mut row: Vec<Option<&Expr>> = values.iter().map(Some).collect();
        row.resize(columns.len(), None);
        return Ok(row);
    }

    if insert.columns.len() != values.len() {
        return Err(SqlError::Parse(format!(
            "{table}: {} columns but {} values",
            insert.columns.len(),
            values.len()
        )));
    }
    let mut row = vec![None; columns.len()];
    for (ident, value) in insert.columns.iter().zip(values) {
        let name = ident.value.to_lowercase();
        let idx = columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| SqlError::UnknownColumn(table, name.clone()))?;
        if row[idx].replace(value).is_some() {
            return Err(SqlError::Parse(format!("{table}: column {name} given twice")));
        }
    }
    Ok(row)
}

fn required<'a>(
    row: &[Option<&'a Expr>],
    columns: &[&'static str],
    idx: usize,
) -> Result<&'a Expr, SqlError> {
    row[idx].ok_or(SqlError::MissingColumn(columns[idx]))
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = match &delete.selection {
        Some(expr) => collect_eq_filters(expr)?,
        None => BTreeMap::new(),
    };

    match table.as_str() {
        "halls" => {
            let code = filters.get("code").ok_or(SqlError::MissingFilter("code"))?;
            Ok(Command::DeleteHall {
                code: ResourceId::new(code),
            })
        }
        "bookings" => {
            let id = filters.get("id").ok_or(SqlError::MissingFilter("id"))?;
            Ok(Command::DeleteBooking {
                id: parse_ulid_str(id)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let mut filters = match &select.selection {
        Some(expr) => collect_eq_filters(expr)?,
        None => BTreeMap::new(),
    };

    match table.as_str() {
        "halls" => {
            reject_unknown_filters(&filters, &[])?;
            Ok(Command::SelectHalls)
        }
        "bookings" => {
            reject_unknown_filters(&filters, &["status", "requested_by", "hall"])?;
            let status = match filters.get("status") {
                Some(s) => Some(s.parse::<BookingStatus>().map_err(SqlError::Parse)?),
                None => None,
            };
            Ok(Command::SelectBookings {
                filter: BookingFilter {
                    status,
                    requested_by: filters.remove("requested_by"),
                    hall: filters.remove("hall").map(ResourceId::new),
                },
            })
        }
        "availability" => {
            reject_unknown_filters(&filters, &["hall", "date", "start_time", "end_time"])?;
            Ok(Command::SelectAvailability {
                parts: QueryParts {
                    hall: filters.remove("hall"),
                    date: filters.remove("date"),
                    start_time: filters.remove("start_time"),
                    end_time: filters.remove("end_time"),
                },
            })
        }
        "day_view" | "hall_overview" => {
            reject_unknown_filters(&filters, &["date"])?;
            let date = filters.get("date").ok_or(SqlError::MissingFilter("date"))?;
            let date = parse_date(date).map_err(|_| SqlError::Parse(format!("bad date: {date}")))?;
            if table == "day_view" {
                Ok(Command::SelectDayView { date })
            } else {
                Ok(Command::SelectHallOverview { date })
            }
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `a = 'x' AND b = 'y'` into `{a: x, b: y}`. Anything else is unsupported.
fn collect_eq_filters(expr: &Expr) -> Result<BTreeMap<String, String>, SqlError> {
    let mut out = BTreeMap::new();
    collect_into(expr, &mut out)?;
    Ok(out)
}

fn collect_into(expr: &Expr, out: &mut BTreeMap<String, String>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_into(inner, out),
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_into(left, out)?;
                collect_into(right, out)
            }
            ast::BinaryOperator::Eq => {
                let col = expr_column_name(left)
                    .ok_or_else(|| SqlError::Unsupported(format!("filter {expr}")))?;
                out.insert(col, parse_string(right)?);
                Ok(())
            }
            _ => Err(SqlError::Unsupported(format!("operator {op}"))),
        },
        _ => Err(SqlError::Unsupported(format!("filter {expr}"))),
    }
}

fn reject_unknown_filters(
    filters: &BTreeMap<String, String>,
    allowed: &[&str],
) -> Result<(), SqlError> {
    match filters.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(col) => Err(SqlError::Unsupported(format!("filter on {col}"))),
        None => Ok(()),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

/// The single VALUES row of an INSERT.
fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

/// String or number literal as text.
fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

/// Optional text column: absent, NULL and `''` all mean `None`.
fn optional_string(value: Option<&Expr>) -> Result<Option<String>, SqlError> {
    match value {
        None => Ok(None),
        Some(v) if is_null(v) => Ok(None),
        Some(v) => {
            let s = parse_string(v)?;
            Ok(if s.trim().is_empty() { None } else { Some(s) })
        }
    }
}

fn parse_ulid_str(s: &str) -> Result<Ulid, SqlError> {
    Ulid::from_string(s.trim()).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    parse_ulid_str(&parse_string(expr)?)
}

fn parse_ulid_or_null(expr: &Expr) -> Result<Option<Ulid>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_ulid(expr).map(Some)
}

fn parse_u32_or_null(expr: &Expr) -> Result<Option<u32>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    let s = parse_string(expr)?;
    s.trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|_| SqlError::Parse(format!("bad capacity: {s}")))
}

fn parse_date_expr(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string(expr)?;
    parse_date(&s).map_err(|_| SqlError::Parse(format!("bad date: {s}")))
}

fn parse_time_expr(expr: &Expr, column: &str) -> Result<chrono::NaiveTime, SqlError> {
    let s = parse_string(expr)?;
    parse_time(&s).map_err(|_| SqlError::Parse(format!("bad {column}: {s}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    UnknownColumn(&'static str, String),
    MissingColumn(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected at least {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::UnknownColumn(t, col) => write!(f, "unknown column: {t}.{col}"),
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[test]
    fn parse_insert_hall() {
        let cmd = parse_sql("INSERT INTO halls (code, capacity) VALUES (' A-205 ', 60)").unwrap();
        assert_eq!(
            cmd,
            Command::InsertHall {
                code: ResourceId::new("A-205"),
                capacity: Some(60),
            }
        );
    }

    #[test]
    fn parse_insert_hall_without_capacity() {
        let cmd = parse_sql("INSERT INTO halls (code) VALUES ('Auditorium')").unwrap();
        assert!(matches!(cmd, Command::InsertHall { capacity: None, .. }));
        let cmd = parse_sql("INSERT INTO halls (code, capacity) VALUES ('Auditorium', NULL)").unwrap();
        assert!(matches!(cmd, Command::InsertHall { capacity: None, .. }));
    }

    #[test]
    fn parse_insert_hall_bad_capacity() {
        let result = parse_sql("INSERT INTO halls (code, capacity) VALUES ('A-205', -1)");
        assert!(result.is_err());
    }

    #[test]
    fn parse_delete_hall() {
        let cmd = parse_sql("DELETE FROM halls WHERE code = 'A-205'").unwrap();
        assert_eq!(
            cmd,
            Command::DeleteHall {
                code: ResourceId::new("A-205")
            }
        );
    }

    #[test]
    fn parse_insert_booking_minimal() {
        let sql = format!(
            "INSERT INTO bookings (id, hall, date, start_time, end_time, event_title, faculty_name) \
             VALUES ('{ID}', 'A-205', '2024-03-01', '10:00', '11:30', 'Seminar', 'Dr. Rao')"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking { request } => {
                assert_eq!(request.id.to_string(), ID);
                assert_eq!(request.resource_id.as_str(), "A-205");
                assert_eq!(request.date, parse_date("2024-03-01").unwrap());
                assert_eq!(request.end_time, parse_time("11:30").unwrap());
                assert_eq!(request.details.event_title, "Seminar");
                assert_eq!(request.details.faculty_email, None);
            }
            other => panic!("expected InsertBooking, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_booking_full_with_generated_id() {
        let sql = "INSERT INTO bookings VALUES (NULL, 'A-205', '2024-03-01', '10:00:00', '11:00:00', \
                   'Seminar', 'Dr. Rao', 'Physics', 'Professor', 'rao@example.edu', '')";
        match parse_sql(sql).unwrap() {
            Command::InsertBooking { request } => {
                assert_eq!(request.details.faculty_department.as_deref(), Some("Physics"));
                assert_eq!(request.details.faculty_designation.as_deref(), Some("Professor"));
                assert_eq!(request.details.faculty_email.as_deref(), Some("rao@example.edu"));
                assert_eq!(request.details.event_description, None);
            }
            other => panic!("expected InsertBooking, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_booking_reordered_columns() {
        let sql = "INSERT INTO bookings (faculty_name, hall, event_title, end_time, start_time, date, faculty_email) \
                   VALUES ('Dr. Rao', 'A-205', 'Seminar', '11:30', '10:00', '2024-03-01', 'rao@example.edu')";
        match parse_sql(sql).unwrap() {
            Command::InsertBooking { request } => {
                assert_eq!(request.resource_id.as_str(), "A-205");
                assert_eq!(request.details.event_title, "Seminar");
                assert_eq!(request.details.faculty_name, "Dr. Rao");
                assert_eq!(request.start_time, parse_time("10:00").unwrap());
                assert_eq!(request.end_time, parse_time("11:30").unwrap());
                assert_eq!(request.details.faculty_email.as_deref(), Some("rao@example.edu"));
                assert_eq!(request.details.faculty_department, None);
            }
            other => panic!("expected InsertBooking, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_column_list_errors() {
        assert!(matches!(
            parse_sql("INSERT INTO halls (capacity, code, colour) VALUES (60, 'A-205', 'red')"),
            Err(SqlError::UnknownColumn("halls", ref c)) if c == "colour"
        ));
        assert!(matches!(
            parse_sql("INSERT INTO halls (capacity) VALUES (60)"),
            Err(SqlError::MissingColumn("code"))
        ));
        assert!(matches!(
            parse_sql("INSERT INTO bookings (hall, date, start_time, end_time, event_title) \
                       VALUES ('A-205', '2024-03-01', '10:00', '11:00', 'Seminar')"),
            Err(SqlError::MissingColumn("faculty_name"))
        ));
        assert!(matches!(
            parse_sql("INSERT INTO halls (code, code) VALUES ('A', 'B')"),
            Err(SqlError::Parse(_))
        ));
        assert!(matches!(
            parse_sql("INSERT INTO halls (code, capacity) VALUES ('A')"),
            Err(SqlError::Parse(_))
        ));
    }

    #[test]
    fn parse_insert_hall_reordered_columns() {
        assert_eq!(
            parse_sql("INSERT INTO halls (capacity, code) VALUES (60, 'A-205')").unwrap(),
            Command::InsertHall {
                code: ResourceId::new("A-205"),
                capacity: Some(60),
            }
        );
    }

    #[test]
    fn parse_insert_booking_too_few_values() {
        let result = parse_sql("INSERT INTO bookings VALUES (NULL, 'A-205', '2024-03-01')");
        assert!(matches!(result, Err(SqlError::WrongArity("bookings", 7, 3))));
    }

    #[test]
    fn parse_insert_booking_bad_time() {
        let sql = "INSERT INTO bookings VALUES (NULL, 'A-205', '2024-03-01', 'ten', '11:00', 'S', 'F')";
        assert!(matches!(parse_sql(sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_approval_and_rejection() {
        let cmd = parse_sql(&format!("INSERT INTO approvals (booking_id) VALUES ('{ID}')")).unwrap();
        assert!(matches!(cmd, Command::ApproveBooking { id } if id.to_string() == ID));

        let cmd = parse_sql(&format!(
            "INSERT INTO rejections (booking_id, reason) VALUES ('{ID}', 'exam week')"
        ))
        .unwrap();
        assert!(matches!(
            cmd,
            Command::RejectBooking { reason: Some(ref r), .. } if r == "exam week"
        ));

        let cmd = parse_sql(&format!("INSERT INTO rejections (booking_id) VALUES ('{ID}')")).unwrap();
        assert!(matches!(cmd, Command::RejectBooking { reason: None, .. }));
    }

    #[test]
    fn parse_delete_booking() {
        let cmd = parse_sql(&format!("DELETE FROM bookings WHERE id = '{ID}'")).unwrap();
        assert!(matches!(cmd, Command::DeleteBooking { .. }));
        assert!(matches!(
            parse_sql("DELETE FROM bookings"),
            Err(SqlError::MissingFilter("id"))
        ));
    }

    #[test]
    fn parse_select_halls() {
        assert_eq!(parse_sql("SELECT * FROM halls").unwrap(), Command::SelectHalls);
    }

    #[test]
    fn parse_select_bookings_filters() {
        let cmd = parse_sql(
            "SELECT * FROM bookings WHERE status = 'pending' AND requested_by = 'alice' AND hall = 'A-205'",
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::SelectBookings {
                filter: BookingFilter {
                    status: Some(BookingStatus::Pending),
                    requested_by: Some("alice".into()),
                    hall: Some(ResourceId::new("A-205")),
                }
            }
        );
        assert_eq!(
            parse_sql("SELECT * FROM bookings").unwrap(),
            Command::SelectBookings {
                filter: BookingFilter::default()
            }
        );
    }

    #[test]
    fn parse_select_bookings_bad_status() {
        assert!(parse_sql("SELECT * FROM bookings WHERE status = 'cancelled'").is_err());
        assert!(matches!(
            parse_sql("SELECT * FROM bookings WHERE colour = 'red'"),
            Err(SqlError::Unsupported(_))
        ));
    }

    #[test]
    fn parse_select_availability() {
        let cmd = parse_sql(
            "SELECT * FROM availability WHERE hall = 'A-205' AND date = '2024-03-01' \
             AND start_time = '10:00' AND end_time = '11:00'",
        )
        .unwrap();
        match cmd {
            Command::SelectAvailability { parts } => {
                assert_eq!(parts.hall.as_deref(), Some("A-205"));
                assert_eq!(parts.date.as_deref(), Some("2024-03-01"));
                assert_eq!(parts.start_time.as_deref(), Some("10:00"));
                assert_eq!(parts.end_time.as_deref(), Some("11:00"));
            }
            other => panic!("expected SelectAvailability, got {other:?}"),
        }
    }

    #[test]
    fn parse_select_availability_missing_filters_is_not_an_error() {
        let cmd = parse_sql("SELECT * FROM availability WHERE hall = 'A-205'").unwrap();
        match cmd {
            Command::SelectAvailability { parts } => {
                assert_eq!(parts.date, None);
                assert_eq!(parts.start_time, None);
            }
            other => panic!("expected SelectAvailability, got {other:?}"),
        }
    }

    #[test]
    fn parse_select_day_view_and_overview() {
        let date = parse_date("2024-03-01").unwrap();
        assert_eq!(
            parse_sql("SELECT * FROM day_view WHERE date = '2024-03-01'").unwrap(),
            Command::SelectDayView { date }
        );
        assert_eq!(
            parse_sql("SELECT * FROM hall_overview WHERE date = '2024-03-01'").unwrap(),
            Command::SelectHallOverview { date }
        );
        assert!(matches!(
            parse_sql("SELECT * FROM day_view"),
            Err(SqlError::MissingFilter("date"))
        ));
        assert!(matches!(
            parse_sql("SELECT * FROM day_view WHERE date = 'tomorrow'"),
            Err(SqlError::Parse(_))
        ));
    }

    #[test]
    fn parse_range_filter_unsupported() {
        assert!(matches!(
            parse_sql("SELECT * FROM bookings WHERE hall > 'A'"),
            Err(SqlError::Unsupported(_))
        ));
    }

    #[test]
    fn parse_unknown_table_errors() {
        assert!(matches!(
            parse_sql("INSERT INTO resources (id) VALUES ('x')"),
            Err(SqlError::UnknownTable(_))
        ));
        assert!(matches!(
            parse_sql("SELECT * FROM rooms"),
            Err(SqlError::UnknownTable(_))
        ));
    }

    #[test]
    fn parse_multi_row_insert_unsupported() {
        let result = parse_sql("INSERT INTO halls (code) VALUES ('A'), ('B')");
        assert!(matches!(result, Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
