//! Service-specific tests
//!
//! Supervisor, channel service and monitor tests run against an in-memory
//! process table and channel store; the relay binary is never executed.


// Common test utilities for services
pub mod common {
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::io;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use shared::{Channel, Destination, Protocol, SrtMode};

    use crate::core::command::{CommandBuilder, RelayInvocation};
    use crate::core::layout::FileLayout;
    use crate::core::probe::ProbeReport;
    use crate::error::OrchestratorResult;
    use crate::services::channel_service::ChannelService;
    use crate::services::supervisor::Supervisor;
    use crate::state::RuntimeState;
    use crate::traits::{ChannelStore, MediaProber, MockMediaProber, ProcessTable};

    #[derive(Default)]
    struct TableState {
        next_pid: u32,
        alive: HashSet<u32>,
        spawned: Vec<RelayInvocation>,
        fail_on_spawn: Option<usize>,
        signalled: Vec<u32>,
        patterns: Vec<String>,
    }

    /// Process table that hands out pids without running anything
    pub struct FakeProcessTable {
        state: Mutex<TableState>,
    }

    impl FakeProcessTable {
        pub fn new() -> Self {
            Self {
                state: Mutex::new(TableState {
                    next_pid: 4000,
                    ..Default::default()
                }),
            }
        }

        /// Fail the `n`th spawn (zero based) with `NotFound`
        pub fn failing_on(n: usize) -> Self {
            let table = Self::new();
            table.state.lock().unwrap().fail_on_spawn = Some(n);
            table
        }

        /// Simulate the process exiting on its own
        pub fn exit(&self, pid: u32) {
            self.state.lock().unwrap().alive.remove(&pid);
        }

        /// Pretend `pid` is a live process
        pub fn adopt(&self, pid: u32) {
            self.state.lock().unwrap().alive.insert(pid);
        }

        pub fn is_alive(&self, pid: u32) -> bool {
            self.state.lock().unwrap().alive.contains(&pid)
        }

        pub fn alive_count(&self) -> usize {
            self.state.lock().unwrap().alive.len()
        }

        pub fn spawned(&self) -> Vec<RelayInvocation> {
            self.state.lock().unwrap().spawned.clone()
        }

        pub fn signalled(&self) -> Vec<u32> {
            self.state.lock().unwrap().signalled.clone()
        }

        pub fn patterns(&self) -> Vec<String> {
            self.state.lock().unwrap().patterns.clone()
        }
    }

    fn no_such_process() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "No such process")
    }

    #[async_trait]
    impl ProcessTable for FakeProcessTable {
        async fn spawn(&self, invocation: &RelayInvocation) -> io::Result<u32> {
            let mut state = self.state.lock().unwrap();
            if state.fail_on_spawn == Some(state.spawned.len()) {
                state.fail_on_spawn = None;
                return Err(io::Error::new(io::ErrorKind::NotFound, "No such file or directory"));
            }
            state.spawned.push(invocation.clone());
            let pid = state.next_pid;
            state.next_pid += 1;
            state.alive.insert(pid);
            Ok(pid)
        }

        fn exists(&self, pid: u32) -> bool {
            self.is_alive(pid)
        }

        async fn kill_group(&self, pid: u32) -> io::Result<()> {
            let mut state = self.state.lock().unwrap();
            state.signalled.push(pid);
            if state.alive.remove(&pid) {
                Ok(())
            } else {
                Err(no_such_process())
            }
        }

        async fn kill_pid(&self, pid: u32) -> io::Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.alive.remove(&pid) {
                Ok(())
            } else {
                Err(no_such_process())
            }
        }

        async fn kill_matching(&self, pattern: &str) -> bool {
            self.state.lock().unwrap().patterns.push(pattern.to_string());
            false
        }
    }

    /// Channel store backed by a vector, counting saves
    #[derive(Default)]
    pub struct MemoryStore {
        channels: Mutex<Vec<Channel>>,
        saves: Mutex<usize>,
    }

    impl MemoryStore {
        pub fn with(channels: Vec<Channel>) -> Self {
            Self {
                channels: Mutex::new(channels),
                saves: Mutex::new(0),
            }
        }

        pub fn snapshot(&self) -> Vec<Channel> {
            self.channels.lock().unwrap().clone()
        }

        pub fn saves(&self) -> usize {
            *self.saves.lock().unwrap()
        }
    }

    #[async_trait]
    impl ChannelStore for Arc<MemoryStore> {
        async fn load(&self) -> OrchestratorResult<Vec<Channel>> {
            Ok(self.snapshot())
        }

        async fn save(&self, channels: &[Channel]) -> OrchestratorResult<()> {
            *self.channels.lock().unwrap() = channels.to_vec();
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// Prober that reports every running channel online
    pub struct OnlineProber;

    #[async_trait]
    impl MediaProber for OnlineProber {
        async fn probe(&self, channel: &Channel) -> ProbeReport {
            ProbeReport::from_ffprobe(
                &channel.channel_name,
                "udp://127.0.0.1:9000",
                r#"{"format": {"format_name": "mpegts", "bit_rate": "4000000"},
                    "streams": [{"index": 0, "codec_type": "video", "codec_name": "h264",
                                 "width": 1920, "height": 1080, "r_frame_rate": "25/1"}]}"#,
            )
            .unwrap()
        }
    }

    /// Prober that never answers within a test's lifetime
    pub struct StalledProber;

    #[async_trait]
    impl MediaProber for StalledProber {
        async fn probe(&self, channel: &Channel) -> ProbeReport {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            ProbeReport::offline(&channel.channel_name, "stalled")
        }
    }

    pub fn builder(dir: &Path) -> CommandBuilder {
        CommandBuilder::new("srt-live-transmit", FileLayout::new(dir.join("stats"), dir.join("logs")))
    }

    /// `cam1`: SRT listener input on 9000, caller output to viewer.example:9100
    pub fn cam1() -> Channel {
        let mut channel = Channel::new("cam1");
        channel.input_protocol = Protocol::Srt;
        channel.input_mode = SrtMode::Listener;
        channel.input_port = 9000;
        channel.output_protocol = Protocol::Srt;
        channel.mode = SrtMode::Caller;
        channel.destination_host = "viewer.example".to_string();
        channel.output_port = 9100;
        channel
    }

    pub fn destination(host: &str, port: u16) -> Destination {
        Destination {
            host: host.to_string(),
            port,
            ..Default::default()
        }
    }

    /// `cam1` fanned out to destA and destB
    pub fn cam1_fan_out() -> Channel {
        let mut channel = cam1();
        channel.destinations = Some(vec![destination("destA", 9100), destination("destB", 9101)]);
        channel
    }

    pub type TestService<M> = ChannelService<FakeProcessTable, Arc<MemoryStore>, M>;

    pub struct Harness<M: MediaProber + 'static> {
        pub dir: tempfile::TempDir,
        pub table: Arc<FakeProcessTable>,
        pub store: Arc<MemoryStore>,
        pub service: TestService<M>,
    }

    pub fn harness_with<M: MediaProber + 'static>(
        table: FakeProcessTable,
        channels: Vec<Channel>,
        prober: M,
    ) -> Harness<M> {
        let dir = tempfile::TempDir::new().unwrap();
        let table = Arc::new(table);
        let store = Arc::new(MemoryStore::with(channels));
        let supervisor = Supervisor::new(Arc::clone(&table), builder(dir.path()))
            .with_settle_delay(std::time::Duration::from_millis(10));
        let service = ChannelService::new(
            Arc::clone(&store),
            supervisor,
            prober,
            Arc::new(RuntimeState::in_memory()),
        );
        Harness {
            dir,
            table,
            store,
            service,
        }
    }

    /// Harness whose prober must never be called
    pub fn harness(channels: Vec<Channel>) -> Harness<MockMediaProber> {
        harness_with(FakeProcessTable::new(), channels, MockMediaProber::new())
    }
}
