use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::America::Los_Angeles;
use chrono_tz::Tz;
use pretty_assertions::assert_eq;
use transit_monitor::normalizer::{DEFAULT_MAX_ARRIVALS, normalize};
use transit_monitor::parser::parse_feed;

fn now() -> DateTime<Tz> {
    Utc.with_ymd_and_hms(2025, 3, 4, 17, 0, 0)
        .unwrap()
        .with_timezone(&Los_Angeles)
}

fn summary(bytes: &[u8], line: Option<&str>, max: usize) -> Vec<(String, u64, String)> {
    let feed = parse_feed(bytes).expect("Failed to parse feed");
    normalize(&feed, line, &now(), max)
        .into_iter()
        .map(|a| (a.line_ref, a.minutes_away, a.formatted_time))
        .collect()
}

fn owned(rows: &[(&str, u64, &str)]) -> Vec<(String, u64, String)> {
    rows.iter()
        .map(|(l, m, t)| (l.to_string(), *m, t.to_string()))
        .collect()
}

#[test]
fn test_full_pipeline() {
    let bytes = include_bytes!("fixtures/stop_monitoring_14366.xml");

    assert_eq!(
        summary(bytes, None, DEFAULT_MAX_ARRIVALS),
        owned(&[
            ("14", 1, "09:01"),
            ("52", 2, "09:02"),
            ("52", 5, "09:05"),
            ("52", 12, "09:12"),
            ("14", 20, "09:20"),
        ])
    );
}

#[test]
fn test_pipeline_with_line_filter() {
    let bytes = include_bytes!("fixtures/stop_monitoring_14366.xml");

    assert_eq!(
        summary(bytes, Some("52"), DEFAULT_MAX_ARRIVALS),
        owned(&[("52", 2, "09:02"), ("52", 5, "09:05"), ("52", 12, "09:12")])
    );
    assert_eq!(
        summary(bytes, Some("14"), DEFAULT_MAX_ARRIVALS),
        owned(&[("14", 1, "09:01"), ("14", 20, "09:20")])
    );
    assert!(summary(bytes, Some("J"), DEFAULT_MAX_ARRIVALS).is_empty());
}

#[test]
fn test_pipeline_truncates() {
    let bytes = include_bytes!("fixtures/stop_monitoring_14366.xml");
    assert_eq!(
        summary(bytes, None, 2),
        owned(&[("14", 1, "09:01"), ("52", 2, "09:02")])
    );
}

#[test]
fn test_pipeline_with_byte_order_mark() {
    let plain = include_bytes!("fixtures/stop_monitoring_14366.xml");
    let bom = include_bytes!("fixtures/stop_monitoring_bom.xml");

    assert_eq!(&bom[..3], b"\xEF\xBB\xBF");
    assert_eq!(
        summary(bom, None, DEFAULT_MAX_ARRIVALS),
        summary(plain, None, DEFAULT_MAX_ARRIVALS)
    );
}

fn feed_xml(offsets_secs: &[i64]) -> String {
    let base = Utc.with_ymd_and_hms(2025, 3, 4, 17, 0, 0).unwrap();
    let visits: String = offsets_secs
        .iter()
        .map(|s| {
            format!(
                "<MonitoredStopVisit><MonitoredVehicleJourney><LineRef>52</LineRef>\
                 <MonitoredCall><ExpectedArrivalTime>{}</ExpectedArrivalTime></MonitoredCall>\
                 </MonitoredVehicleJourney></MonitoredStopVisit>",
                (base + Duration::seconds(*s)).to_rfc3339()
            )
        })
        .collect();
    format!(
        "<Siri><ServiceDelivery><StopMonitoringDelivery>{visits}</StopMonitoringDelivery></ServiceDelivery></Siri>"
    )
}

#[test]
fn test_fifteen_visits_keep_ten_soonest() {
    let offsets: Vec<i64> = (0..15).map(|i| (14 - i) * 60 + 20).collect();
    let xml = feed_xml(&offsets);
    let minutes: Vec<u64> = summary(xml.as_bytes(), None, 10)
        .into_iter()
        .map(|(_, m, _)| m)
        .collect();

    assert_eq!(minutes, (0..10).collect::<Vec<_>>());
}

#[test]
fn test_unordered_visits_are_sorted() {
    let xml = feed_xml(&[5 * 60, 60, 12 * 60]);
    assert_eq!(
        summary(xml.as_bytes(), None, DEFAULT_MAX_ARRIVALS),
        owned(&[("52", 1, "09:01"), ("52", 5, "09:05"), ("52", 12, "09:12")])
    );
}

#[test]
fn test_malformed_visit_keeps_the_rest_of_the_stop() {
    let xml = "<Siri><ServiceDelivery><StopMonitoringDelivery>\
        <MonitoredStopVisit><MonitoredVehicleJourney><LineRef>52</LineRef>\
        <MonitoredCall><ExpectedArrivalTime>2025-03-04T17:03:00Z</ExpectedArrivalTime></MonitoredCall>\
        </MonitoredVehicleJourney></MonitoredStopVisit>\
        <MonitoredStopVisit><MonitoredVehicleJourney><LineRef>52</LineRef>\
        <MonitoredCall><ExpectedArrivalTime>17:<b>04</b></ExpectedArrivalTime></MonitoredCall>\
        </MonitoredVehicleJourney></MonitoredStopVisit>\
        <MonitoredStopVisit><MonitoredVehicleJourney><LineRef>52</LineRef>\
        <MonitoredCall><ExpectedArrivalTime>not a time</ExpectedArrivalTime></MonitoredCall>\
        </MonitoredVehicleJourney></MonitoredStopVisit>\
        </StopMonitoringDelivery>\
        <StopMonitoringDelivery>\
        <MonitoredStopVisit><MonitoredVehicleJourney><LineRef>52</LineRef>\
        <MonitoredCall><ExpectedArrivalTime>2025-03-04T17:08:00Z</ExpectedArrivalTime></MonitoredCall>\
        </MonitoredVehicleJourney></MonitoredStopVisit>\
        </StopMonitoringDelivery></ServiceDelivery></Siri>";

    assert_eq!(
        summary(xml.as_bytes(), Some("52"), DEFAULT_MAX_ARRIVALS),
        owned(&[("52", 3, "09:03"), ("52", 8, "09:08")])
    );
}
