//! XML parser for SIRI `StopMonitoring` feeds.
//!
//! Only the subset the arrival board needs is modelled: every
//! `MonitoredStopVisit` with its `LineRef` and `ExpectedArrivalTime`.
//! Everything else in the document is ignored.

use anyhow::{Context, Result, anyhow, bail};
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, Event};
use tracing::warn;

const VISIT: &[u8] = b"MonitoredStopVisit";
const LINE_REF: &[u8] = b"LineRef";
const EXPECTED_ARRIVAL_TIME: &[u8] = b"ExpectedArrivalTime";

/// A parsed feed: zero or more stop visits in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    pub visits: Vec<StopVisit>,
}

/// One predicted vehicle visit to the monitored stop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopVisit {
    pub line_ref: Option<String>,
    pub expected_arrival_time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    LineRef,
    ExpectedArrivalTime,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            LINE_REF => Some(Self::LineRef),
            EXPECTED_ARRIVAL_TIME => Some(Self::ExpectedArrivalTime),
            _ => None,
        }
    }
}

/// Text of a field element being read, and the depth it was opened at.
struct Capture {
    field: Field,
    depth: usize,
    text: String,
}

/// A `MonitoredStopVisit` being read. The first `LineRef` and the first
/// `ExpectedArrivalTime` anywhere inside it win.
struct VisitBuilder {
    index: usize,
    depth: usize,
    visit: StopVisit,
    capture: Option<Capture>,
    malformed: Option<String>,
}

impl VisitBuilder {
    fn new(index: usize, depth: usize) -> Self {
        Self {
            index,
            depth,
            visit: StopVisit::default(),
            capture: None,
            malformed: None,
        }
    }

    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::LineRef => &mut self.visit.line_ref,
            Field::ExpectedArrivalTime => &mut self.visit.expected_arrival_time,
        }
    }

    fn open(&mut self, name: &[u8], depth: usize, empty: bool) {
        if let Some(capture) = &self.capture {
            self.mark_malformed(format!(
                "unexpected element <{}> inside {:?}",
                String::from_utf8_lossy(name),
                capture.field
            ));
            return;
        }
        let Some(field) = Field::from_name(name) else {
            return;
        };
        if self.slot(field).is_some() {
            return;
        }
        if empty {
            *self.slot(field) = Some(String::new());
        } else {
            self.capture = Some(Capture {
                field,
                depth,
                text: String::new(),
            });
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(capture) = &mut self.capture {
            capture.text.push_str(text);
        }
    }

    fn close(&mut self, depth: usize) {
        if self.capture.as_ref().is_some_and(|c| c.depth == depth) {
            if let Some(capture) = self.capture.take() {
                *self.slot(capture.field) = Some(capture.text.trim().to_string());
            }
        }
    }

    fn mark_malformed(&mut self, reason: String) {
        self.malformed.get_or_insert(reason);
    }

    fn finish(self) -> Option<StopVisit> {
        match self.malformed {
            Some(reason) => {
                warn!(visit = self.index, %reason, "Skipping malformed stop visit");
                None
            }
            None => Some(self.visit),
        }
    }
}

/// Decodes a `StopMonitoring` XML body into a [`FeedDocument`].
///
/// Visits are collected wherever they appear, across all deliveries, in
/// document order. A visit whose content cannot be read is logged and
/// skipped; the rest of the feed is kept. A leading UTF-8 byte order mark
/// is tolerated.
///
/// # Errors
///
/// Returns an error if the bytes are not UTF-8 or not well-formed XML.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedDocument> {
    let text = std::str::from_utf8(bytes).context("feed is not valid UTF-8")?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = Reader::from_str(text);
    let mut visits = Vec::new();
    let mut current: Option<VisitBuilder> = None;
    let mut seen = 0;
    let mut depth = 0;
    let mut has_root = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            anyhow!(
                "feed is not well-formed XML at byte {}: {e}",
                reader.error_position()
            )
        })?;

        match event {
            Event::Start(e) => {
                depth += 1;
                has_root = true;
                let name = e.local_name();
                if let Some(visit) = current.as_mut() {
                    visit.open(name.as_ref(), depth, false);
                } else if name.as_ref() == VISIT {
                    current = Some(VisitBuilder::new(seen, depth));
                    seen += 1;
                }
            }
            Event::Empty(e) => {
                has_root = true;
                let name = e.local_name();
                if let Some(visit) = current.as_mut() {
                    visit.open(name.as_ref(), depth + 1, true);
                } else if name.as_ref() == VISIT {
                    visits.push(StopVisit::default());
                    seen += 1;
                }
            }
            Event::End(_) => {
                let closes_visit = match current.as_mut() {
                    Some(visit) => {
                        visit.close(depth);
                        visit.depth == depth
                    }
                    None => false,
                };
                if closes_visit {
                    if let Some(done) = current.take().and_then(VisitBuilder::finish) {
                        visits.push(done);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(e) => {
                if let Some(visit) = &mut current {
                    match e.decode() {
                        Ok(text) => visit.push_text(&text),
                        Err(err) => visit.mark_malformed(err.to_string()),
                    }
                }
            }
            Event::CData(e) => {
                if let Some(visit) = &mut current {
                    match e.decode() {
                        Ok(text) => visit.push_text(&text),
                        Err(err) => visit.mark_malformed(err.to_string()),
                    }
                }
            }
            Event::GeneralRef(e) => {
                if let Some(visit) = &mut current {
                    match resolve_reference(&e) {
                        Ok(text) => visit.push_text(&text),
                        Err(reason) => visit.mark_malformed(reason),
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !has_root {
        bail!("feed has no root element");
    }
    if depth != 0 {
        bail!("feed ends with {depth} unclosed element(s)");
    }

    Ok(FeedDocument { visits })
}

/// Expands `&name;` and `&#N;` references found in text.
fn resolve_reference(reference: &BytesRef<'_>) -> std::result::Result<String, String> {
    if let Some(c) = reference.resolve_char_ref().map_err(|e| e.to_string())? {
        return Ok(c.to_string());
    }
    let name = reference.decode().map_err(|e| e.to_string())?;
    resolve_predefined_entity(&name)
        .map(str::to_string)
        .ok_or_else(|| format!("unknown entity &{name};"))
}
