// Latest-value hand-off between the command subscriber and the control loop
//
// The subscriber runs on the async runtime with unpredictable latency, the
// control loop runs on a fixed period and must never wait on it. The channel
// is a triple buffer over atomics: the writer fills a private back slot and
// swaps it into the shared middle position, the reader swaps the middle slot
// out only when it holds something newer. Each side owns its slot
// exclusively, so both operations are wait-free and a read always returns the
// most recent completed write.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, error};

use crate::config::CommandConfig;
use crate::messages::VelocityCommand;
use crate::throttle::Throttle;

/// Set on the middle index when it holds a write the reader has not taken
const FRESH: u8 = 0b100;
const INDEX: u8 = 0b011;

/// A body-frame velocity command stamped with its arrival time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Command {
    pub linear: f64,
    pub angular: f64,
    /// Controller time of arrival. Zero before the first write.
    pub stamp: Duration,
}

impl Command {
    pub fn new(linear: f64, angular: f64, stamp: Duration) -> Self {
        Self {
            linear,
            angular,
            stamp,
        }
    }

    /// Zero velocity, keeping the stamp
    pub fn stopped(stamp: Duration) -> Self {
        Self::new(0.0, 0.0, stamp)
    }

    /// True until the first real command has been written
    pub fn is_unset(&self) -> bool {
        self.stamp.is_zero()
    }
}

#[derive(Debug, Default)]
struct Slot {
    linear: AtomicU64,
    angular: AtomicU64,
    stamp_ns: AtomicU64,
}

impl Slot {
    fn store(&self, cmd: Command) {
        self.linear.store(cmd.linear.to_bits(), Ordering::Relaxed);
        self.angular.store(cmd.angular.to_bits(), Ordering::Relaxed);
        self.stamp_ns.store(duration_to_nanos(cmd.stamp), Ordering::Relaxed);
    }

    fn load(&self) -> Command {
        Command::new(
            f64::from_bits(self.linear.load(Ordering::Relaxed)),
            f64::from_bits(self.angular.load(Ordering::Relaxed)),
            Duration::from_nanos(self.stamp_ns.load(Ordering::Relaxed)),
        )
    }
}

#[derive(Debug)]
struct Shared {
    slots: [Slot; 3],
    /// Index of the slot between writer and reader, plus the `FRESH` flag
    middle: AtomicU8,
    running: AtomicBool,
}

/// Producer half. Not `Clone`: the channel assumes a single writer.
#[derive(Debug)]
pub struct CommandWriter {
    shared: Arc<Shared>,
    back: u8,
}

/// Consumer half, owned by the control loop.
#[derive(Debug)]
pub struct CommandReader {
    shared: Arc<Shared>,
    front: u8,
}

/// Create a connected writer/reader pair. Reads return a zero command with a
/// zero stamp until the first write.
pub fn command_channel() -> (CommandWriter, CommandReader) {
    let shared = Arc::new(Shared {
        slots: Default::default(),
        middle: AtomicU8::new(1),
        running: AtomicBool::new(false),
    });
    (
        CommandWriter {
            shared: Arc::clone(&shared),
            back: 0,
        },
        CommandReader { shared, front: 2 },
    )
}

impl CommandWriter {
    /// Replace the stored command. Never blocks.
    pub fn write(&mut self, cmd: Command) {
        let s = &self.shared;
        s.slots[usize::from(self.back)].store(cmd);
        let previous = s.middle.swap(self.back | FRESH, Ordering::AcqRel);
        self.back = previous & INDEX;
    }

    /// Whether the control loop is currently accepting commands
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }
}

impl CommandReader {
    /// Latest fully written command.
    pub fn read_latest(&mut self) -> Command {
        let s = &self.shared;
        if s.middle.load(Ordering::Relaxed) & FRESH != 0 {
            let previous = s.middle.swap(self.front, Ordering::AcqRel);
            self.front = previous & INDEX;
        }
        s.slots[usize::from(self.front)].load()
    }

    pub fn set_running(&self, running: bool) {
        self.shared.running.store(running, Ordering::Release);
    }
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Why an incoming command was not handed to the control loop
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandRejected {
    #[error("Controller is not running")]
    NotRunning,

    #[error("Command contains a non-finite value")]
    NonFinite,

    #[error("Detected {count} publishers, only 1 is allowed")]
    MultiplePublishers { count: usize },
}

/// Sources seen within the staleness window
#[derive(Debug, Default)]
struct PublisherTracker {
    seen: Vec<(String, Duration)>,
}

impl PublisherTracker {
    fn observe(&mut self, source: &str, now: Duration, window: Duration) -> usize {
        self.seen.retain(|(_, at)| now.saturating_sub(*at) <= window);
        match self.seen.iter_mut().find(|(name, _)| name == source) {
            Some(entry) => entry.1 = now,
            None => self.seen.push((source.to_string(), now)),
        }
        self.seen.len()
    }
}

/// Producer-side gate: validates incoming commands and writes them into the
/// channel with their arrival stamp.
#[derive(Debug)]
pub struct CommandInput {
    writer: CommandWriter,
    allow_multiple_publishers: bool,
    window: Duration,
    publishers: PublisherTracker,
    throttle: Throttle,
}

impl CommandInput {
    pub fn new(writer: CommandWriter, config: &CommandConfig) -> Self {
        Self {
            writer,
            allow_multiple_publishers: config.allow_multiple_cmd_vel_publishers,
            window: config.timeout(),
            publishers: PublisherTracker::default(),
            throttle: Throttle::new(Duration::from_secs(1)),
        }
    }

    /// Stamp `cmd` with `now` and hand it to the control loop.
    ///
    /// With the single-publisher policy, a second active source writes a
    /// stop command instead so the vehicle brakes.
    pub fn submit(&mut self, cmd: &VelocityCommand, now: Duration) -> Result<(), CommandRejected> {
        if !self.writer.is_running() {
            error!("Can't accept new commands. Controller is not running.");
            return Err(CommandRejected::NotRunning);
        }

        if !self.allow_multiple_publishers {
            let source = cmd.source.as_deref().unwrap_or_default();
            let count = self.publishers.observe(source, now, self.window);
            if count > 1 {
                if self.throttle.ready(now) {
                    error!("Detected {} publishers. Only 1 publisher is allowed. Braking...", count);
                }
                self.writer.write(Command::stopped(now));
                return Err(CommandRejected::MultiplePublishers { count });
            }
        }

        if !(cmd.linear.is_finite() && cmd.angular.is_finite()) {
            return Err(CommandRejected::NonFinite);
        }

        self.writer.write(Command::new(cmd.linear, cmd.angular, now));
        debug!(
            "Added values to command. Ang: {}, Lin: {}, Stamp: {:?}",
            cmd.angular, cmd.linear, now
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn cmd(linear: f64, angular: f64, source: Option<&str>) -> VelocityCommand {
        VelocityCommand {
            linear,
            angular,
            source: source.map(str::to_string),
        }
    }

    #[test]
    fn test_read_before_write_is_zero() {
        let (_writer, mut reader) = command_channel();
        let latest = reader.read_latest();
        assert_eq!(latest, Command::default());
        assert_eq!(latest.stamp, Duration::ZERO);
    }

    #[test]
    fn test_latest_write_wins() {
        let (mut writer, mut reader) = command_channel();
        writer.write(Command::new(1.0, 0.1, Duration::from_millis(10)));
        writer.write(Command::new(2.0, -0.2, Duration::from_millis(20)));
        assert_eq!(
            reader.read_latest(),
            Command::new(2.0, -0.2, Duration::from_millis(20))
        );
        // Reading does not consume
        assert_eq!(reader.read_latest().linear, 2.0);
    }

    #[test]
    fn test_concurrent_reads_are_never_torn() {
        let (mut writer, mut reader) = command_channel();
        reader.set_running(true);

        // Every written command has linear == angular == stamp in ms
        let producer = thread::spawn(move || {
            for i in 1..=20_000u64 {
                let v = i as f64;
                writer.write(Command::new(v, v, Duration::from_millis(i)));
            }
        });

        let mut last_stamp = Duration::ZERO;
        for _ in 0..20_000 {
            let c = reader.read_latest();
            assert_eq!(c.linear, c.angular, "torn read: {:?}", c);
            assert_eq!(c.stamp, Duration::from_millis(c.linear as u64));
            assert!(c.stamp >= last_stamp, "stamps went backwards");
            last_stamp = c.stamp;
        }
        producer.join().unwrap();

        assert_eq!(reader.read_latest().stamp, Duration::from_millis(20_000));
    }

    #[test]
    fn test_write_in_progress_does_not_hide_completed_write() {
        let (mut writer, mut reader) = command_channel();
        writer.write(Command::new(1.0, 0.0, Duration::from_millis(10)));
        assert_eq!(reader.read_latest().stamp, Duration::from_millis(10));
        writer.write(Command::new(2.0, 0.0, Duration::from_millis(20)));

        // Third write stalls halfway through filling its slot
        let back = &writer.shared.slots[usize::from(writer.back)];
        back.linear.store(3.0f64.to_bits(), Ordering::Relaxed);

        assert_eq!(
            reader.read_latest(),
            Command::new(2.0, 0.0, Duration::from_millis(20))
        );

        writer.write(Command::new(3.0, 0.3, Duration::from_millis(30)));
        assert_eq!(
            reader.read_latest(),
            Command::new(3.0, 0.3, Duration::from_millis(30))
        );
    }

    #[test]
    fn test_slots_stay_exclusive_across_many_swaps() {
        let (mut writer, mut reader) = command_channel();
        for i in 1..=50u64 {
            writer.write(Command::new(i as f64, 0.0, Duration::from_millis(i)));
            if i % 3 == 0 {
                assert_eq!(reader.read_latest().stamp, Duration::from_millis(i));
            }
            assert_ne!(writer.back, reader.front);
        }
        assert_eq!(reader.read_latest().stamp, Duration::from_millis(50));
    }

    #[test]
    fn test_rejects_when_not_running() {
        let (writer, mut reader) = command_channel();
        let mut input = CommandInput::new(writer, &CommandConfig::default());
        assert_eq!(
            input.submit(&cmd(1.0, 0.0, None), Duration::from_secs(1)),
            Err(CommandRejected::NotRunning)
        );
        assert_eq!(reader.read_latest(), Command::default());
    }

    #[test]
    fn test_submit_stamps_with_arrival_time() {
        let (writer, mut reader) = command_channel();
        reader.set_running(true);
        let mut input = CommandInput::new(writer, &CommandConfig::default());

        input.submit(&cmd(0.8, 0.3, None), Duration::from_millis(1500)).unwrap();
        assert_eq!(
            reader.read_latest(),
            Command::new(0.8, 0.3, Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_rejects_non_finite() {
        let (writer, mut reader) = command_channel();
        reader.set_running(true);
        let mut input = CommandInput::new(writer, &CommandConfig::default());

        assert_eq!(
            input.submit(&cmd(f64::NAN, 0.0, None), Duration::from_secs(1)),
            Err(CommandRejected::NonFinite)
        );
        assert_eq!(reader.read_latest(), Command::default());
    }

    #[test]
    fn test_second_publisher_brakes_when_disallowed() {
        let (writer, mut reader) = command_channel();
        reader.set_running(true);
        let config = CommandConfig {
            cmd_vel_timeout: 0.5,
            allow_multiple_cmd_vel_publishers: false,
        };
        let mut input = CommandInput::new(writer, &config);

        input.submit(&cmd(1.0, 0.0, Some("teleop")), Duration::from_millis(100)).unwrap();
        input.submit(&cmd(1.0, 0.0, Some("teleop")), Duration::from_millis(200)).unwrap();

        let result = input.submit(&cmd(0.5, 0.2, Some("planner")), Duration::from_millis(300));
        assert_eq!(result, Err(CommandRejected::MultiplePublishers { count: 2 }));
        assert_eq!(
            reader.read_latest(),
            Command::stopped(Duration::from_millis(300))
        );

        // Once the first source has gone quiet for longer than the window, the
        // second one is accepted alone
        input
            .submit(&cmd(0.5, 0.2, Some("planner")), Duration::from_millis(900))
            .unwrap();
        assert_eq!(reader.read_latest().linear, 0.5);
    }

    #[test]
    fn test_multiple_publishers_allowed_by_default() {
        let (writer, mut reader) = command_channel();
        reader.set_running(true);
        let mut input = CommandInput::new(writer, &CommandConfig::default());

        input.submit(&cmd(1.0, 0.0, Some("a")), Duration::from_millis(100)).unwrap();
        input.submit(&cmd(2.0, 0.0, Some("b")), Duration::from_millis(110)).unwrap();
        assert_eq!(reader.read_latest().linear, 2.0);
    }
}
