use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Shape checks for a booking request. Returns the requested span.
pub(crate) fn validate_request(request: &BookingRequest) -> Result<Span, EngineError> {
    if request.resource_id.is_empty() {
        return Err(EngineError::InvalidRequest("hall is required"));
    }
    if request.resource_id.as_str().len() > MAX_CODE_LEN {
        return Err(EngineError::LimitExceeded("hall code too long"));
    }
    let details = &request.details;
    if details.event_title.trim().is_empty() {
        return Err(EngineError::InvalidRequest("event title is required"));
    }
    if details.faculty_name.trim().is_empty() {
        return Err(EngineError::InvalidRequest("faculty name is required"));
    }
    let texts = [
        Some(details.event_title.as_str()),
        Some(details.faculty_name.as_str()),
        details.event_description.as_deref(),
        details.faculty_department.as_deref(),
        details.faculty_designation.as_deref(),
        details.faculty_email.as_deref(),
    ];
    if texts.iter().flatten().any(|t| t.len() > MAX_TEXT_LEN) {
        return Err(EngineError::LimitExceeded("text field too long"));
    }
    if let Some(email) = details.faculty_email.as_deref()
        && !email.is_empty()
        && !looks_like_email(email)
    {
        return Err(EngineError::InvalidRequest("faculty email is not a valid address"));
    }

    let span = request.span();
    if !span.is_well_formed() {
        return Err(EngineError::InvalidSpan(span));
    }
    Ok(span)
}

/// `local@domain.tld`: no whitespace, exactly one `@`, and a dot inside the domain.
pub(crate) fn looks_like_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Any pending or approved reservation on this hall overlapping `span` is a conflict.
pub(crate) fn check_no_conflict(hs: &HallState, span: &Span) -> Result<(), EngineError> {
    match hs.overlapping(span).find(|r| r.status.is_blocking()) {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}

/// Approval re-check: another *approved* reservation overlapping `span`.
///
/// `create_booking` already refuses overlaps, so this only trips on state that
/// did not come through it: a WAL written by hand or by an older build that
/// admitted overlapping pending requests.
pub(crate) fn check_no_approved_conflict(
    hs: &HallState,
    candidate: &Reservation,
) -> Result<(), EngineError> {
    match hs
        .overlapping(&candidate.span)
        .find(|r| r.id != candidate.id && r.status == BookingStatus::Approved)
    {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}

pub(crate) fn validate_user(session: &Session) -> Result<(), EngineError> {
    if session.user.len() > MAX_USER_LEN {
        return Err(EngineError::LimitExceeded("user name too long"));
    }
    Ok(())
}
