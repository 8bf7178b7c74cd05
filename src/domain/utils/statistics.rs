use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::sync::{OnceLock, mpsc};
use std::thread;

/// Target of the structured `tracing` events emitted next to every statistics row.
pub const ANALYTICS_TARGET: &str = "production_analytics";

/// Columns of the statistics CSV. Every event sets a subset of them; the rest are written as `NA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatParameter {
    /// Scheduling clock in seconds at the time of the event.
    Time,

    /// Allocate, Reserve, Confirm, Expire, Release or Rollback.
    Command,

    /// Manager that handled the command, e.g. "mixers" or "staff".
    Component,

    /// Unit (equipment or staff member) affected, if any.
    Unit,

    Order,
    Activity,
    Quantity,
    Start,
    End,

    /// Number of trial windows examined by a backward search.
    Attempts,

    /// "ok", "failed", "waiting" or a count of released entries.
    Outcome,
}

impl StatParameter {
    const ALL: [StatParameter; 11] = [
        StatParameter::Time,
        StatParameter::Command,
        StatParameter::Component,
        StatParameter::Unit,
        StatParameter::Order,
        StatParameter::Activity,
        StatParameter::Quantity,
        StatParameter::Start,
        StatParameter::End,
        StatParameter::Attempts,
        StatParameter::Outcome,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            StatParameter::Time => "Time",
            StatParameter::Command => "Command",
            StatParameter::Component => "Component",
            StatParameter::Unit => "Unit",
            StatParameter::Order => "Order",
            StatParameter::Activity => "Activity",
            StatParameter::Quantity => "Quantity",
            StatParameter::Start => "Start",
            StatParameter::End => "End",
            StatParameter::Attempts => "Attempts",
            StatParameter::Outcome => "Outcome",
        }
    }

    /// Column order of the CSV header.
    pub fn headers() -> Vec<&'static str> {
        Self::ALL.iter().map(StatParameter::header).collect()
    }
}

/// store values in their native format, only format them when writing to the CSV.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Integer(i64),
    Text(String),
}

impl From<i64> for StatValue {
    fn from(v: i64) -> Self {
        StatValue::Integer(v)
    }
}

impl From<u64> for StatValue {
    fn from(v: u64) -> Self {
        StatValue::Integer(v as i64)
    }
}

impl From<usize> for StatValue {
    fn from(v: usize) -> Self {
        StatValue::Integer(v as i64)
    }
}

impl From<String> for StatValue {
    fn from(v: String) -> Self {
        StatValue::Text(v)
    }
}

impl From<&str> for StatValue {
    fn from(v: &str) -> Self {
        StatValue::Text(v.to_string())
    }
}

impl StatValue {
    fn render(&self) -> String {
        match self {
            StatValue::Integer(i) => i.to_string(),
            StatValue::Text(t) => t.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatisticEvent {
    data: HashMap<StatParameter, StatValue>,
}

impl StatisticEvent {
    pub fn new(command: &str) -> Self {
        let mut event = Self::default();
        event.set(StatParameter::Command, command);
        event
    }

    pub fn set<V: Into<StatValue>>(&mut self, param: StatParameter, value: V) -> &mut Self {
        self.data.insert(param, value.into());
        self
    }

    pub fn get(&self, param: StatParameter) -> Option<&StatValue> {
        self.data.get(&param)
    }

    fn row(&self) -> Vec<String> {
        StatParameter::ALL.iter().map(|param| self.data.get(param).map_or_else(|| "NA".to_string(), StatValue::render)).collect()
    }
}

/// Messages sent from the scheduling threads to the writer thread.
enum StatsMessage {
    Log(StatisticEvent),
    Flush(mpsc::Sender<()>),
}

/// Handle that forwards events to the background CSV writer.
pub struct StatsCollector {
    sender: mpsc::Sender<StatsMessage>,
}

impl StatsCollector {
    /// Spawns the writer thread. Without a file name the rows go to stdout.
    pub fn init(filename: Option<String>) -> io::Result<Self> {
        let writer: Box<dyn Write + Send> = match filename {
            Some(f) => Box::new(File::create(f)?),
            None => Box::new(io::stdout()),
        };

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || Self::worker_loop(rx, writer));

        Ok(StatsCollector { sender: tx })
    }

    fn worker_loop(rx: mpsc::Receiver<StatsMessage>, writer: Box<dyn Write + Send>) {
        let mut csv_wtr = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);

        if let Err(e) = csv_wtr.write_record(StatParameter::headers()) {
            log::error!("Stats Error: Failed to write headers: {}", e);
        }

        for msg in rx {
            match msg {
                StatsMessage::Log(event) => {
                    if let Err(e) = csv_wtr.write_record(event.row()) {
                        log::error!("Stats Error: Failed to write record: {}", e);
                    }
                }
                StatsMessage::Flush(done) => {
                    let _ = csv_wtr.flush();
                    let _ = done.send(());
                }
            }
        }

        let _ = csv_wtr.flush();
    }

    pub fn add_event(&self, event: StatisticEvent) {
        // A stopped writer must not stop scheduling.
        let _ = self.sender.send(StatsMessage::Log(event));
    }

    /// Blocks until every event sent so far has been written.
    pub fn flush(&self) {
        let (tx, rx) = mpsc::channel();
        if self.sender.send(StatsMessage::Flush(tx)).is_ok() {
            let _ = rx.recv();
        }
    }
}

static GLOBAL_STATS: OnceLock<StatsCollector> = OnceLock::new();

/// Initialize the global statistics collector. Later calls keep the first collector.
pub fn init_global(filename: Option<String>) -> io::Result<()> {
    let collector = StatsCollector::init(filename)?;
    let _ = GLOBAL_STATS.set(collector);
    Ok(())
}

pub fn flush_global() {
    if let Some(collector) = GLOBAL_STATS.get() {
        collector.flush();
    }
}

/// Records an event in the CSV (when initialised) and as a structured `tracing` event.
pub fn add_global_event(event: StatisticEvent) {
    let row = event.row();
    tracing::debug!(target: ANALYTICS_TARGET, command = %row[1], component = %row[2], order = %row[4], activity = %row[5], outcome = %row[10]);

    if let Some(collector) = GLOBAL_STATS.get() {
        collector.add_event(event);
    }
}
