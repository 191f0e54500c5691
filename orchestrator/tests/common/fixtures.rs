//! Test fixtures and data for orchestrator tests

use shared::{Channel, Destination, Protocol, SrtMode};

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const CHANNEL: &'static str = "cam1";
    pub const VIEWER_HOST: &'static str = "viewer.example";

    /// Passphrase carrying shell metacharacters and spaces
    pub const HOSTILE_PASSPHRASE: &'static str = "a&b;c d rm -rf";

    /// Telemetry header in the relay's column order
    pub const CSV_HEADER: &'static str = "Time,pktSent,pktRecv,pktSndLoss,pktRcvLoss,byteSent,byteRecv,mbpsBandwidth,msRTT,mbpsSendRate,mbpsRecvRate,pktRetrans";

    /// Stand-in relay: writes one telemetry row to its `-statsout:` path
    /// and a connection line to stdout, then idles until signalled
    pub const FAKE_RELAY: &'static str = r#"#!/bin/sh
out=""
for arg in "$@"; do
    case "$arg" in
        -statsout:*) out="${arg#-statsout:}" ;;
    esac
done
if [ -n "$out" ]; then
    printf 'Time,mbpsBandwidth,msRTT,pktRcvLoss\n1,5.0,20,2\n' > "$out"
fi
echo "Accepted SRT target connection"
echo "request from: 10.0.0.7:50123"
exec sleep 30
"#;

    /// Single-output channel: SRT listener in, caller out to the viewer
    pub fn cam1() -> Channel {
        let mut channel = Channel::new(Self::CHANNEL);
        channel.input_protocol = Protocol::Srt;
        channel.input_mode = SrtMode::Listener;
        channel.input_port = 9000;
        channel.output_protocol = Protocol::Srt;
        channel.mode = SrtMode::Caller;
        channel.destination_host = Self::VIEWER_HOST.to_string();
        channel.output_port = 9100;
        channel
    }

    /// `cam1` fanned out to two destinations
    pub fn cam1_fan_out() -> Channel {
        let mut channel = Self::cam1();
        channel.destinations = Some(vec![
            Destination {
                host: "destA".to_string(),
                port: 9100,
                ..Default::default()
            },
            Destination {
                host: "destB".to_string(),
                port: 9101,
                ..Default::default()
            },
        ]);
        channel
    }

    /// UDP multicast fan-out destination
    pub fn multicast_destination() -> Destination {
        Destination {
            protocol: Protocol::Udp,
            multicast_ip: "239.1.1.1".to_string(),
            adapter: "10.0.0.2".to_string(),
            port: 5000,
            ttl: 16,
            ..Default::default()
        }
    }

    /// `rows` telemetry rows, one every sample interval
    pub fn telemetry_rows(rows: usize, bandwidth: f64, rtt: f64) -> String {
        let mut csv = format!("{}\n", Self::CSV_HEADER);
        for i in 0..rows {
            csv.push_str(&format!("{i},100,100,0,1,1316,1316,{bandwidth},{rtt},1.0,1.0,0\n"));
        }
        csv
    }
}
