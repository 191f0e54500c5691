//! Relay telemetry parsing and aggregation
//!
//! The relay appends one CSV row per report interval. Columns are located
//! by header name so reordered or extended CSV layouts still parse;
//! columns we do not know are ignored and columns we expect but do not
//! find read as zero. Everything here is pure; file access lives in the
//! aggregator service.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use shared::ValidationError;

use crate::error::OrchestratorError;

/// Seconds between two telemetry rows
pub const SAMPLE_INTERVAL_SECS: u64 = 5;

/// One telemetry row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    #[serde(rename = "Time")]
    pub timestamp: String,
    pub pkt_sent: u64,
    pub pkt_recv: u64,
    pub pkt_snd_loss: u64,
    pub pkt_rcv_loss: u64,
    pub byte_sent: u64,
    pub byte_recv: u64,
    pub mbps_bandwidth: f64,
    #[serde(rename = "msRTT")]
    pub ms_rtt: f64,
    pub mbps_send_rate: f64,
    pub mbps_recv_rate: f64,
    pub pkt_retrans: u64,
}

/// Outcome of reading one telemetry file
///
/// Only `Failed` signals a problem; a process that has not reported yet
/// leaves a missing or empty file.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryRead {
    Missing,
    Empty,
    Records(Vec<TelemetryRecord>),
    Failed(String),
}

impl TelemetryRead {
    pub fn records(&self) -> &[TelemetryRecord] {
        match self {
            Self::Records(records) => records,
            _ => &[],
        }
    }

    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.records().last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Time,
    PktSent,
    PktRecv,
    PktSndLoss,
    PktRcvLoss,
    ByteSent,
    ByteRecv,
    MbpsBandwidth,
    MsRtt,
    MbpsSendRate,
    MbpsRecvRate,
    PktRetrans,
}

impl Column {
    fn from_header(name: &str) -> Option<Self> {
        Some(match name.trim() {
            "Time" => Self::Time,
            "pktSent" => Self::PktSent,
            "pktRecv" => Self::PktRecv,
            "pktSndLoss" | "pktSentLoss" => Self::PktSndLoss,
            "pktRcvLoss" => Self::PktRcvLoss,
            "byteSent" => Self::ByteSent,
            "byteRecv" => Self::ByteRecv,
            "mbpsBandwidth" => Self::MbpsBandwidth,
            "msRTT" => Self::MsRtt,
            "mbpsSendRate" => Self::MbpsSendRate,
            "mbpsRecvRate" => Self::MbpsRecvRate,
            "pktRetrans" => Self::PktRetrans,
            _ => return None,
        })
    }
}

fn parse_count(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return Some(0);
    }
    value
        .parse::<u64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.max(0.0) as u64))
}

fn parse_rate(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return Some(0.0);
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_row(columns: &[Option<Column>], fields: &[&str]) -> Result<TelemetryRecord, String> {
    if fields.len() != columns.len() {
        return Err(format!("expected {} fields, found {}", columns.len(), fields.len()));
    }
    let mut record = TelemetryRecord::default();
    for (column, raw) in columns.iter().zip(fields) {
        let Some(column) = column else { continue };
        let bad = || format!("invalid value '{}' for {:?}", raw.trim(), column);
        match column {
            Column::Time => record.timestamp = raw.trim().to_string(),
            Column::PktSent => record.pkt_sent = parse_count(raw).ok_or_else(bad)?,
            Column::PktRecv => record.pkt_recv = parse_count(raw).ok_or_else(bad)?,
            Column::PktSndLoss => record.pkt_snd_loss = parse_count(raw).ok_or_else(bad)?,
            Column::PktRcvLoss => record.pkt_rcv_loss = parse_count(raw).ok_or_else(bad)?,
            Column::ByteSent => record.byte_sent = parse_count(raw).ok_or_else(bad)?,
            Column::ByteRecv => record.byte_recv = parse_count(raw).ok_or_else(bad)?,
            Column::MbpsBandwidth => record.mbps_bandwidth = parse_rate(raw).ok_or_else(bad)?,
            Column::MsRtt => record.ms_rtt = parse_rate(raw).ok_or_else(bad)?,
            Column::MbpsSendRate => record.mbps_send_rate = parse_rate(raw).ok_or_else(bad)?,
            Column::MbpsRecvRate => record.mbps_recv_rate = parse_rate(raw).ok_or_else(bad)?,
            Column::PktRetrans => record.pkt_retrans = parse_count(raw).ok_or_else(bad)?,
        }
    }
    Ok(record)
}

/// Parse the full text of a telemetry CSV
///
/// A last line without a terminating newline may be a row the relay is
/// still writing; it is dropped if it does not parse. Any other bad row
/// fails the whole read.
pub fn parse_telemetry(text: &str) -> TelemetryRead {
    let mut lines: Vec<&str> = text.lines().collect();
    let partial_tail = !text.ends_with('\n');
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }

    let Some((header, rows)) = lines.split_first() else {
        return TelemetryRead::Empty;
    };
    let columns: Vec<Option<Column>> = header.split(',').map(Column::from_header).collect();
    if !columns.iter().any(Option::is_some) {
        return TelemetryRead::Failed(format!("unrecognised telemetry header: {header}"));
    }

    let mut records = Vec::with_capacity(rows.len());
    for (i, line) in rows.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        match parse_row(&columns, &fields) {
            Ok(record) => records.push(record),
            Err(_) if partial_tail && i + 1 == rows.len() => break,
            Err(reason) => return TelemetryRead::Failed(format!("row {}: {reason}", i + 2)),
        }
    }

    if records.is_empty() {
        TelemetryRead::Empty
    } else {
        TelemetryRead::Records(records)
    }
}

/// Trailing time window of a telemetry series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeWindow {
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    OneWeek,
    #[serde(rename = "all")]
    All,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::SixHours => "6h",
            Self::OneDay => "24h",
            Self::OneWeek => "7d",
            Self::All => "all",
        }
    }

    pub fn seconds(&self) -> Option<u64> {
        match self {
            Self::FiveMinutes => Some(5 * 60),
            Self::FifteenMinutes => Some(15 * 60),
            Self::ThirtyMinutes => Some(30 * 60),
            Self::OneHour => Some(60 * 60),
            Self::SixHours => Some(6 * 60 * 60),
            Self::OneDay => Some(24 * 60 * 60),
            Self::OneWeek => Some(7 * 24 * 60 * 60),
            Self::All => None,
        }
    }

    /// Maximum number of rows the window covers
    pub fn row_limit(&self) -> Option<usize> {
        self.seconds().map(|secs| (secs / SAMPLE_INTERVAL_SECS) as usize)
    }

    /// Trailing slice of `records` inside the window
    pub fn apply<'a>(&self, records: &'a [TelemetryRecord]) -> &'a [TelemetryRecord] {
        match self.row_limit() {
            Some(limit) if records.len() > limit => &records[records.len() - limit..],
            _ => records,
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeWindow {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "5m" => Self::FiveMinutes,
            "15m" => Self::FifteenMinutes,
            "30m" => Self::ThirtyMinutes,
            "1h" => Self::OneHour,
            "6h" => Self::SixHours,
            "24h" => Self::OneDay,
            "7d" => Self::OneWeek,
            "all" => Self::All,
            other => return Err(ValidationError::TimeWindow { value: other.to_string() }.into()),
        })
    }
}

/// Sum of the latest sample of every channel
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetSummary {
    pub total_bandwidth: f64,
    pub total_packets_sent: u64,
    pub total_packets_recv: u64,
    pub total_bytes_sent: u64,
    pub total_bytes_recv: u64,
    pub avg_rtt: f64,
    pub total_packet_loss: u64,
}

impl FleetSummary {
    /// Counters are summed; RTT is averaged over channels reporting one
    pub fn from_latest<'a>(latest: impl IntoIterator<Item = &'a TelemetryRecord>) -> Self {
        let mut summary = Self::default();
        let mut rtts = Vec::new();
        for record in latest {
            summary.total_bandwidth += record.mbps_bandwidth;
            summary.total_packets_sent += record.pkt_sent;
            summary.total_packets_recv += record.pkt_recv;
            summary.total_bytes_sent += record.byte_sent;
            summary.total_bytes_recv += record.byte_recv;
            summary.total_packet_loss += record.pkt_rcv_loss;
            if record.ms_rtt > 0.0 {
                rtts.push(record.ms_rtt);
            }
        }
        summary.avg_rtt = mean(&rtts);
        summary
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Windowed series of one channel
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSeries {
    pub data: Vec<TelemetryRecord>,
    pub total_records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatsSeries {
    pub fn from_read(read: &TelemetryRead, window: TimeWindow) -> Self {
        let message = match read {
            TelemetryRead::Missing => Some("No stats available".to_string()),
            TelemetryRead::Empty => Some("No stats collected yet. Start the channel to collect statistics.".to_string()),
            TelemetryRead::Failed(reason) => Some(format!("Error reading stats: {reason}")),
            TelemetryRead::Records(_) => None,
        };
        let data = window.apply(read.records()).to_vec();
        Self {
            total_records: data.len(),
            data,
            message,
        }
    }

    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.data.last()
    }
}

/// Latest-sample figures of one channel for dashboards
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuickStats {
    pub bandwidth_mbps: f64,
    pub send_rate_mbps: f64,
    pub recv_rate_mbps: f64,
    pub rtt_ms: f64,
    pub packets_lost_send: u64,
    pub packets_lost_recv: u64,
    pub packets_retransmitted: u64,
}

impl QuickStats {
    pub fn packets_lost(&self) -> u64 {
        self.packets_lost_send + self.packets_lost_recv
    }
}

impl From<&TelemetryRecord> for QuickStats {
    fn from(record: &TelemetryRecord) -> Self {
        Self {
            bandwidth_mbps: record.mbps_bandwidth,
            send_rate_mbps: record.mbps_send_rate,
            recv_rate_mbps: record.mbps_recv_rate,
            rtt_ms: record.ms_rtt,
            packets_lost_send: record.pkt_snd_loss,
            packets_lost_recv: record.pkt_rcv_loss,
            packets_retransmitted: record.pkt_retrans,
        }
    }
}

/// Fleet-wide dashboard totals
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsTotals {
    pub total_channels: usize,
    pub running: usize,
    pub stopped: usize,
    pub total_bandwidth_mbps: f64,
    pub total_send_rate_mbps: f64,
    pub total_recv_rate_mbps: f64,
    pub total_packet_loss: u64,
    pub avg_rtt_ms: f64,
}

impl AnalyticsTotals {
    /// `channels` yields whether each channel runs and its latest stats
    pub fn collect<'a>(channels: impl IntoIterator<Item = (bool, Option<&'a QuickStats>)>) -> Self {
        let mut totals = Self::default();
        let mut rtts = Vec::new();
        for (running, stats) in channels {
            totals.total_channels += 1;
            if !running {
                totals.stopped += 1;
                continue;
            }
            totals.running += 1;
            if let Some(stats) = stats {
                totals.total_bandwidth_mbps += stats.bandwidth_mbps;
                totals.total_send_rate_mbps += stats.send_rate_mbps;
                totals.total_recv_rate_mbps += stats.recv_rate_mbps;
                totals.total_packet_loss += stats.packets_lost();
                if stats.rtt_ms > 0.0 {
                    rtts.push(stats.rtt_ms);
                }
            }
        }
        totals.avg_rtt_ms = (mean(&rtts) * 100.0).round() / 100.0;
        totals
    }
}

/// A caller currently connected to a listener output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerConnection {
    pub remote_ip: String,
    pub remote_port: u16,
    pub local_port: u16,
    pub direction: &'static str,
    pub state: &'static str,
}

/// Peers connected according to the relay log
///
/// The relay logs `request from: <ip>:<port>` on accept and
/// `SRT target disconnected` when its target drops; a disconnect clears
/// every peer seen so far.
pub fn connections_from_log(log: &str, local_port: u16) -> Vec<PeerConnection> {
    const ACCEPT_MARKER: &str = "request from: ";
    const DISCONNECT_MARKER: &str = "SRT target disconnected";

    let mut peers: HashMap<String, u16> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for line in log.lines() {
        if let Some(pos) = line.find(ACCEPT_MARKER) {
            let rest = &line[pos + ACCEPT_MARKER.len()..];
            let addr: String = rest.chars().take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ':').collect();
            if let Some((ip, port)) = addr.rsplit_once(':') {
                if let (Ok(ip), Ok(port)) = (ip.parse::<std::net::Ipv4Addr>(), port.parse::<u16>()) {
                    let ip = ip.to_string();
                    if peers.insert(ip.clone(), port).is_none() {
                        order.push(ip);
                    }
                }
            }
        }
        if line.contains(DISCONNECT_MARKER) {
            peers.clear();
            order.clear();
        }
    }

    order
        .into_iter()
        .filter_map(|ip| {
            peers.get(&ip).map(|port| PeerConnection {
                remote_ip: ip.clone(),
                remote_port: *port,
                local_port,
                direction: "output",
                state: "ESTAB",
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Time,SocketID,pktFlowWindow,pktCongestionWindow,pktFlightSize,msRTT,mbpsBandwidth,mbpsMaxBW,pktSent,pktSndLoss,pktSndDrop,pktRetrans,byteSent,byteAvailSndBuf,byteSndDrop,mbpsSendRate,usPktSndPeriod,msSndBuf,pktRecv,pktRcvLoss,pktRcvDrop,pktRcvRetrans,pktRcvBelated,byteRecv,byteAvailRcvBuf,byteRcvLoss,byteRcvDrop,mbpsRecvRate,msRcvBuf,msRcvTsbPdDelay";

    fn row(time: &str, rtt: f64, bw: f64, sent: u64) -> String {
        format!("{time},1,25600,8192,0,{rtt},{bw},1000,{sent},1,0,2,1316000,12000000,0,4.5,2000,0,{sent},3,0,0,0,1316000,12000000,0,0,4.4,120,120")
    }

    #[test]
    fn test_parse_by_header_name() {
        let text = format!("{HEADER}\n{}\n", row("00:00:05", 12.5, 10.0, 1000));
        let read = parse_telemetry(&text);
        let latest = read.latest().unwrap();

        assert_eq!(latest.timestamp, "00:00:05");
        assert_eq!(latest.ms_rtt, 12.5);
        assert_eq!(latest.mbps_bandwidth, 10.0);
        assert_eq!(latest.pkt_sent, 1000);
        assert_eq!(latest.pkt_snd_loss, 1);
        assert_eq!(latest.pkt_rcv_loss, 3);
        assert_eq!(latest.pkt_retrans, 2);
        assert_eq!(latest.mbps_recv_rate, 4.4);
    }

    #[test]
    fn test_missing_columns_read_as_zero() {
        let read = parse_telemetry("Time,pktSentLoss\n12:00:00,7\n");
        let latest = read.latest().unwrap();
        assert_eq!(latest.pkt_snd_loss, 7);
        assert_eq!(latest.byte_recv, 0);
        assert_eq!(latest.ms_rtt, 0.0);
    }

    #[test]
    fn test_empty_and_header_only() {
        assert_eq!(parse_telemetry(""), TelemetryRead::Empty);
        assert_eq!(parse_telemetry(&format!("{HEADER}\n")), TelemetryRead::Empty);
    }

    #[test]
    fn test_partial_trailing_line_is_skipped() {
        let text = format!("{HEADER}\n{}\n00:00:10,1,256", row("00:00:05", 1.0, 1.0, 1));
        let read = parse_telemetry(&text);
        assert_eq!(read.records().len(), 1);
    }

    #[test]
    fn test_complete_row_without_newline_is_kept() {
        let text = format!("{HEADER}\n{}", row("00:00:05", 1.0, 1.0, 1));
        assert_eq!(parse_telemetry(&text).records().len(), 1);
    }

    #[test]
    fn test_malformed_middle_row_fails() {
        let text = format!("{HEADER}\ngarbage\n{}\n", row("00:00:05", 1.0, 1.0, 1));
        assert!(matches!(parse_telemetry(&text), TelemetryRead::Failed(_)));
    }

    #[test]
    fn test_window_keeps_trailing_rows() {
        let records: Vec<TelemetryRecord> = (0..1000)
            .map(|i| TelemetryRecord {
                pkt_sent: i,
                ..Default::default()
            })
            .collect();

        let window = TimeWindow::FiveMinutes.apply(&records);
        assert_eq!(window.len(), 60);
        assert_eq!(window[0].pkt_sent, 940);
        assert_eq!(window[59].pkt_sent, 999);

        assert_eq!(TimeWindow::All.apply(&records).len(), 1000);
        assert_eq!(TimeWindow::OneWeek.apply(&records).len(), 1000);
        assert_eq!(TimeWindow::OneWeek.row_limit(), Some(120_960));
        assert_eq!(TimeWindow::OneHour.row_limit(), Some(720));
    }

    #[test]
    fn test_window_parsing() {
        assert_eq!("24h".parse::<TimeWindow>().unwrap(), TimeWindow::OneDay);
        assert_eq!("all".parse::<TimeWindow>().unwrap(), TimeWindow::All);
        assert!(matches!(
            "2h".parse::<TimeWindow>(),
            Err(OrchestratorError::Validation(ValidationError::TimeWindow { .. }))
        ));
    }

    #[test]
    fn test_fleet_summary() {
        let a = TelemetryRecord {
            mbps_bandwidth: 10.0,
            ms_rtt: 20.0,
            pkt_sent: 5,
            pkt_rcv_loss: 1,
            ..Default::default()
        };
        let b = TelemetryRecord {
            mbps_bandwidth: 20.0,
            ms_rtt: 40.0,
            pkt_sent: 7,
            pkt_rcv_loss: 2,
            ..Default::default()
        };
        let idle = TelemetryRecord::default();

        let summary = FleetSummary::from_latest([&a, &b, &idle]);
        assert_eq!(summary.total_bandwidth, 30.0);
        assert_eq!(summary.avg_rtt, 30.0);
        assert_eq!(summary.total_packets_sent, 12);
        assert_eq!(summary.total_packet_loss, 3);

        assert_eq!(FleetSummary::from_latest([]), FleetSummary::default());
    }

    #[test]
    fn test_stats_series_messages() {
        let series = StatsSeries::from_read(&TelemetryRead::Missing, TimeWindow::All);
        assert_eq!(series.total_records, 0);
        assert_eq!(series.message.as_deref(), Some("No stats available"));

        let series = StatsSeries::from_read(&TelemetryRead::Failed("row 3".into()), TimeWindow::All);
        assert!(series.message.unwrap().contains("row 3"));
    }

    #[test]
    fn test_analytics_totals() {
        let a = QuickStats {
            bandwidth_mbps: 4.0,
            rtt_ms: 10.0,
            packets_lost_send: 1,
            packets_lost_recv: 2,
            ..Default::default()
        };
        let b = QuickStats {
            bandwidth_mbps: 6.0,
            rtt_ms: 15.333,
            ..Default::default()
        };
        let totals = AnalyticsTotals::collect([(true, Some(&a)), (true, Some(&b)), (false, None), (true, None)]);
        assert_eq!(totals.total_channels, 4);
        assert_eq!(totals.running, 3);
        assert_eq!(totals.stopped, 1);
        assert_eq!(totals.total_bandwidth_mbps, 10.0);
        assert_eq!(totals.total_packet_loss, 3);
        assert_eq!(totals.avg_rtt_ms, 12.67);
    }

    #[test]
    fn test_connections_from_log() {
        let log = "\
Accepted SRT target connection, request from: 10.0.0.7:40001
request from: 10.0.0.8:40002
SRT target disconnected
request from: 10.0.0.9:40003
";
        let peers = connections_from_log(log, 9100);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].remote_ip, "10.0.0.9");
        assert_eq!(peers[0].remote_port, 40003);
        assert_eq!(peers[0].local_port, 9100);
    }

    #[test]
    fn test_record_serializes_with_relay_names() {
        let value = serde_json::to_value(TelemetryRecord::default()).unwrap();
        assert!(value.get("Time").is_some());
        assert!(value.get("msRTT").is_some());
        assert!(value.get("mbpsBandwidth").is_some());
        assert!(value.get("pktRcvLoss").is_some());
    }
}
