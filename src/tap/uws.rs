//! UWS job document parsing.
//!
//! Asynchronous TAP queries are managed through the Universal Worker Service
//! pattern: submitting a query creates a job resource, and the job's XML
//! representation carries its identifier, phase, timestamps, result links,
//! and error summary. Servers disagree on prefixes (`uws:` or none) and on
//! whether result links use `xlink:href`, so parsing is deliberately lenient.

use quick_xml::events::Event;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::debug;

use crate::error::{Result, VoError};
use crate::tap::job::JobPhase;
use crate::xml_utils::{get_attr, get_attr_any, local_name_upper, make_reader};

/// Parsed fields of a UWS job document
#[derive(Debug, Clone, Default)]
pub(crate) struct UwsJob {
    pub job_id: Option<String>,
    pub owner_id: Option<String>,
    pub phase: Option<String>,
    pub quote: Option<OffsetDateTime>,
    pub start_time: Option<OffsetDateTime>,
    pub end_time: Option<OffsetDateTime>,
    pub result_href: Option<String>,
    pub error_message: Option<String>,
}

/// One entry of the job list returned by `GET {tap}/async`
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_id: String,
    pub phase: JobPhase,
    /// Link to the job resource, when the server provides one
    pub href: Option<String>,
    pub creation_time: Option<OffsetDateTime>,
}

#[derive(PartialEq)]
enum Target {
    None,
    JobId,
    OwnerId,
    Phase,
    Quote,
    StartTime,
    EndTime,
    Message,
}

/// Parse a UWS job document.
///
/// Returns [`VoError::XmlError`] if the input is not a job document at all;
/// individual missing fields are tolerated and surface as `None`.
pub(crate) fn parse_job(xml: &str) -> Result<UwsJob> {
    let mut reader = make_reader(xml);
    let mut buf = Vec::new();

    let mut job = UwsJob::default();
    let mut target = Target::None;
    let mut text = String::new();
    let mut saw_job = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Err(err) => {
                return Err(VoError::XmlError(format!("malformed UWS document: {err}")));
            }
            Ok(Event::Eof) => break,

            Ok(Event::Start(ref e)) => {
                match local_name_upper(e.name()).as_slice() {
                    b"JOB" => saw_job = true,
                    b"JOBID" => target = begin_text(&mut text, Target::JobId),
                    b"OWNERID" => target = begin_text(&mut text, Target::OwnerId),
                    b"PHASE" => target = begin_text(&mut text, Target::Phase),
                    b"QUOTE" => target = begin_text(&mut text, Target::Quote),
                    b"STARTTIME" => target = begin_text(&mut text, Target::StartTime),
                    b"ENDTIME" => target = begin_text(&mut text, Target::EndTime),
                    b"MESSAGE" => target = begin_text(&mut text, Target::Message),
                    b"RESULT" => {
                        // The TAP result is the entry with id="result"; keep
                        // the first link otherwise
                        let href = get_attr_any(e, &[b"xlink:href", b"href"]);
                        let is_primary = get_attr(e, b"id").as_deref() == Some("result");
                        if href.is_some() && (job.result_href.is_none() || is_primary) {
                            job.result_href = href;
                        }
                    }
                    _ => {}
                }
            }

            Ok(Event::Text(ref t)) => {
                if target != Target::None {
                    let unescaped = t.unescape().map_err(|err| {
                        VoError::XmlError(format!("invalid character data: {err}"))
                    })?;
                    text.push_str(&unescaped);
                }
            }

            Ok(Event::CData(ref t)) => {
                if target != Target::None {
                    text.push_str(&String::from_utf8_lossy(t));
                }
            }

            Ok(Event::End(ref e)) => {
                let committed = match (local_name_upper(e.name()).as_slice(), &target) {
                    (b"JOBID", Target::JobId) => {
                        job.job_id = non_empty(&text);
                        true
                    }
                    (b"OWNERID", Target::OwnerId) => {
                        job.owner_id = non_empty(&text);
                        true
                    }
                    (b"PHASE", Target::Phase) => {
                        job.phase = non_empty(&text);
                        true
                    }
                    (b"QUOTE", Target::Quote) => {
                        job.quote = parse_timestamp(&text);
                        true
                    }
                    (b"STARTTIME", Target::StartTime) => {
                        job.start_time = parse_timestamp(&text);
                        true
                    }
                    (b"ENDTIME", Target::EndTime) => {
                        job.end_time = parse_timestamp(&text);
                        true
                    }
                    (b"MESSAGE", Target::Message) => {
                        job.error_message = non_empty(&text);
                        true
                    }
                    _ => false,
                };
                if committed {
                    target = Target::None;
                }
            }

            Ok(_) => {}
        }
        buf.clear();
    }

    if !saw_job {
        return Err(VoError::XmlError(
            "response is not a UWS job document".to_string(),
        ));
    }
    Ok(job)
}

/// Parse the UWS job list returned by the async endpoint
pub(crate) fn parse_job_list(xml: &str) -> Result<Vec<JobSummary>> {
    let mut reader = make_reader(xml);
    let mut buf = Vec::new();

    let mut jobs = Vec::new();
    let mut saw_list = false;
    let mut current: Option<JobSummary> = None;
    let mut in_phase = false;
    let mut phase_text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(err) => {
                return Err(VoError::XmlError(format!("malformed UWS job list: {err}")));
            }
            Ok(Event::Eof) => break,

            Ok(Event::Start(ref e)) => match local_name_upper(e.name()).as_slice() {
                b"JOBS" => saw_list = true,
                b"JOBREF" => {
                    current = Some(JobSummary {
                        job_id: get_attr(e, b"id").unwrap_or_default(),
                        phase: JobPhase::parse(""),
                        href: get_attr_any(e, &[b"xlink:href", b"href"]),
                        creation_time: get_attr(e, b"creationTime")
                            .as_deref()
                            .and_then(parse_timestamp),
                    });
                }
                b"PHASE" if current.is_some() => {
                    in_phase = true;
                    phase_text.clear();
                }
                _ => {}
            },

            Ok(Event::Text(ref t)) => {
                if in_phase {
                    let unescaped = t.unescape().map_err(|err| {
                        VoError::XmlError(format!("invalid character data: {err}"))
                    })?;
                    phase_text.push_str(&unescaped);
                }
            }

            Ok(Event::End(ref e)) => match local_name_upper(e.name()).as_slice() {
                b"PHASE" if in_phase => {
                    if let Some(summary) = current.as_mut() {
                        summary.phase = JobPhase::parse(phase_text.trim());
                    }
                    in_phase = false;
                }
                b"JOBREF" => {
                    if let Some(summary) = current.take() {
                        if summary.job_id.is_empty() {
                            debug!("Skipping job list entry without an id");
                        } else {
                            jobs.push(summary);
                        }
                    }
                }
                _ => {}
            },

            Ok(_) => {}
        }
        buf.clear();
    }

    if !saw_list {
        return Err(VoError::XmlError(
            "response is not a UWS job list".to_string(),
        ));
    }
    Ok(jobs)
}

fn begin_text(text: &mut String, target: Target) -> Target {
    text.clear();
    target
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a UWS timestamp.
///
/// UWS nominally uses ISO 8601 with a timezone, but several servers emit
/// bare timestamps; those are taken as UTC. Unset timestamps come through
/// as empty elements or `-1`.
pub(crate) fn parse_timestamp(text: &str) -> Option<OffsetDateTime> {
    let text = text.trim();
    if text.is_empty() || text == "-1" {
        return None;
    }
    if let Ok(parsed) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(parsed);
    }

    let bare_format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let without_zone = text.trim_end_matches('Z');
    let without_fraction = without_zone.split('.').next().unwrap_or(without_zone);
    match PrimitiveDateTime::parse(without_fraction, bare_format) {
        Ok(parsed) => Some(parsed.assume_utc()),
        Err(err) => {
            debug!(timestamp = text, error = %err, "Unparseable UWS timestamp");
            None
        }
    }
}
