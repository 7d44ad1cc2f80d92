use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::HallbookAuthSource;
use crate::engine::{AvailabilityResult, Engine, EngineError, HallDay};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command};

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(HallbookFactory::new(engine, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

pub struct HallbookHandler {
    engine: Arc<Engine>,
    query_parser: Arc<HallbookQueryParser>,
}

impl HallbookHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(HallbookQueryParser),
        }
    }

    /// The session on whose behalf this connection acts: the startup `user`.
    fn session<C: ClientInfo>(&self, client: &C) -> Session {
        let user = client
            .metadata()
            .get("user")
            .cloned()
            .unwrap_or_else(|| "anonymous".to_string());
        Session::new(user)
    }

    async fn run(&self, session: &Session, query: &str) -> PgWireResult<Vec<Response>> {
        let cmd = sql::parse_sql(query).map_err(|e| {
            metrics::counter!(observability::QUERIES_TOTAL, "command" => "unparsed", "status" => "error")
                .increment(1);
            sql_err(e)
        })?;
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(session, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        session: &Session,
        cmd: Command,
    ) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::InsertHall { code, capacity } => {
                engine.create_hall(code, capacity).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::DeleteHall { code } => {
                engine.delete_hall(&code).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertBooking { request } => {
                let reservation = engine
                    .create_booking(session, request)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![booking_response(std::slice::from_ref(&reservation))])
            }
            Command::ApproveBooking { id } => {
                let reservation = engine
                    .approve_booking(session, id)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![booking_response(std::slice::from_ref(&reservation))])
            }
            Command::RejectBooking { id, reason } => {
                let reservation = engine
                    .reject_booking(session, id, reason)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![booking_response(std::slice::from_ref(&reservation))])
            }
            Command::DeleteBooking { id } => {
                engine.cancel_booking(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectHalls => {
                let halls = engine.list_halls().await;
                let schema = Arc::new(hall_schema());
                let rows: Vec<PgWireResult<_>> = halls
                    .iter()
                    .map(|hall| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&hall.code.to_string())?;
                        encoder.encode_field(&hall.capacity.map(i64::from))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectBookings { filter } => {
                let bookings = engine.list_bookings(&filter).await;
                Ok(vec![booking_response(&bookings)])
            }
            Command::SelectAvailability { parts } => {
                let result = engine.check_parts(&parts).await;
                let schema = Arc::new(availability_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&parts.hall.as_deref().map(|h| h.trim().to_string()))?;
                encoder.encode_field(&parts.date)?;
                encoder.encode_field(&parts.start_time)?;
                encoder.encode_field(&parts.end_time)?;
                encoder.encode_field(&result.label().to_string())?;
                encoder.encode_field(&verdict_reason(&result))?;
                encoder.encode_field(&conflicts_json(result.conflicts())?)?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectDayView { date } => {
                let bookings = engine.day_view(date).await;
                Ok(vec![booking_response(&bookings)])
            }
            Command::SelectHallOverview { date } => {
                let overview = engine.hall_overview(date).await;
                Ok(vec![overview_response(&overview)])
            }
        }
    }
}

// ── Result sets ──────────────────────────────────────────────────

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn hall_schema() -> Vec<FieldInfo> {
    vec![
        text_field("code"),
        FieldInfo::new("capacity".into(), None, None, Type::INT8, FieldFormat::Text),
    ]
}

fn booking_schema() -> Vec<FieldInfo> {
    [
        "id",
        "hall",
        "date",
        "start_time",
        "end_time",
        "status",
        "event_title",
        "event_description",
        "faculty_name",
        "faculty_department",
        "faculty_designation",
        "faculty_email",
        "requested_by",
        "decided_by",
        "rejection_reason",
    ]
    .into_iter()
    .map(text_field)
    .collect()
}

fn availability_schema() -> Vec<FieldInfo> {
    [
        "hall",
        "date",
        "start_time",
        "end_time",
        "verdict",
        "reason",
        "conflicts",
    ]
    .into_iter()
    .map(text_field)
    .collect()
}

fn overview_schema() -> Vec<FieldInfo> {
    vec![
        text_field("code"),
        FieldInfo::new("capacity".into(), None, None, Type::INT8, FieldFormat::Text),
        FieldInfo::new("available".into(), None, None, Type::BOOL, FieldFormat::Text),
        FieldInfo::new("bookings".into(), None, None, Type::INT8, FieldFormat::Text),
    ]
}

const TIME_FORMAT: &str = "%H:%M";

fn booking_response(bookings: &[Reservation]) -> Response {
    let schema = Arc::new(booking_schema());
    let rows: Vec<PgWireResult<_>> = bookings
        .iter()
        .map(|r| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&r.id.to_string())?;
            encoder.encode_field(&r.resource_id.to_string())?;
            encoder.encode_field(&r.span.start.date().to_string())?;
            encoder.encode_field(&r.span.start.format(TIME_FORMAT).to_string())?;
            encoder.encode_field(&r.span.end.format(TIME_FORMAT).to_string())?;
            encoder.encode_field(&r.status.to_string())?;
            encoder.encode_field(&r.details.event_title)?;
            encoder.encode_field(&r.details.event_description)?;
            encoder.encode_field(&r.details.faculty_name)?;
            encoder.encode_field(&r.details.faculty_department)?;
            encoder.encode_field(&r.details.faculty_designation)?;
            encoder.encode_field(&r.details.faculty_email)?;
            encoder.encode_field(&r.requested_by)?;
            encoder.encode_field(&r.decided_by)?;
            encoder.encode_field(&r.rejection_reason)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn overview_response(overview: &[HallDay]) -> Response {
    let schema = Arc::new(overview_schema());
    let rows: Vec<PgWireResult<_>> = overview
        .iter()
        .map(|day| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&day.hall.code.to_string())?;
            encoder.encode_field(&day.hall.capacity.map(i64::from))?;
            encoder.encode_field(&day.is_available())?;
            encoder.encode_field(&(day.bookings.len() as i64))?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn verdict_reason(result: &AvailabilityResult) -> Option<String> {
    match result {
        AvailabilityResult::Available => None,
        AvailabilityResult::Unavailable(conflicts) => {
            Some(format!("conflicts with {} booking(s)", conflicts.len()))
        }
        AvailabilityResult::PastTimeSlot => Some("time slot has already passed".into()),
        AvailabilityResult::InvalidQuery(reason) => Some(reason.to_string()),
    }
}

/// Conflicting bookings as a JSON array, `None` when there are none.
fn conflicts_json(conflicts: &[Reservation]) -> PgWireResult<Option<String>> {
    if conflicts.is_empty() {
        return Ok(None);
    }
    let list: Vec<_> = conflicts
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id.to_string(),
                "event_title": r.details.event_title,
                "faculty_name": r.details.faculty_name,
                "status": r.status,
                "start_time": r.span.start.format(TIME_FORMAT).to_string(),
                "end_time": r.span.end.format(TIME_FORMAT).to_string(),
            })
        })
        .collect();
    serde_json::to_string(&list)
        .map(Some)
        .map_err(|e| PgWireError::ApiError(Box::new(e)))
}

/// Result columns for a statement, by the table it names.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    if lower.contains("hall_overview") {
        overview_schema()
    } else if lower.contains("availability") {
        availability_schema()
    } else if lower.contains("day_view")
        || lower.contains("approvals")
        || lower.contains("rejections")
        || (lower.contains("bookings") && !lower.trim_start().starts_with("delete"))
    {
        booking_schema()
    } else if lower.contains("halls") && lower.trim_start().starts_with("select") {
        hall_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for HallbookHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let session = self.session(client);
        self.run(&session, query).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct HallbookQueryParser;

#[async_trait]
impl QueryParser for HallbookQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for HallbookHandler {
    type Statement = String;
    type QueryParser = HallbookQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let session = self.session(client);
        let sql = substitute_params(portal);
        let mut responses = self.run(&session, &sql).await?;
        if responses.is_empty() {
            return Ok(Response::EmptyQuery);
        }
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

fn substitute_params(portal: &Portal<String>) -> String {
    inline_params(&portal.statement.statement, &portal.parameters)
}

/// Inline bound text parameters as quoted literals in one left-to-right pass
/// over the statement, so placeholder-looking text inside a value is kept as is.
/// Placeholders with no bound value are left untouched.
fn inline_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        let param = after[..digits]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| params.get(i));
        match param {
            Some(Some(bytes)) => {
                let text = String::from_utf8_lossy(bytes.as_ref());
                out.push('\'');
                out.push_str(&text.replace('\'', "''"));
                out.push('\'');
            }
            Some(None) => out.push_str("NULL"),
            None => out.push_str(&rest[pos..pos + 1 + digits]),
        }
        rest = &after[digits..];
    }
    out.push_str(rest);
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct HallbookFactory {
    handler: Arc<HallbookHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<HallbookAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl HallbookFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = HallbookAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(HallbookHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for HallbookFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// SQLSTATE for an engine error. Overlaps map to `exclusion_violation`.
fn engine_sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Conflict(_) => "23P01",
        EngineError::HallExists(_) | EngineError::BookingExists(_) => "23505",
        EngineError::HasBookings(_) => "23503",
        EngineError::InvalidSpan(_) | EngineError::InvalidRequest(_) => "22023",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) => "58030",
        _ => "P0001",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    if let EngineError::WalError(msg) = &e {
        tracing::error!("write failed: {msg}");
    }
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        engine_sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
