//! Configuration module
//!
//! Jobs are described in an INI-style job file:
//!
//! ```ini
//! duration=30s
//! error=1205
//!
//! [setup]
//! query=create table t (a int)
//!
//! [inserts]
//! query=insert into t values (1)
//! queue-depth=4
//! rate=1000
//! ```
//!
//! Files ending in `.json` are read as a serialized [`Config`] instead.

use crate::error::ConfigError;
use crate::flavor::FlavorKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Queue depth for paced jobs that do not set one, so pacing rather than slots bounds the rate
pub const DEFAULT_PACED_QUEUE_DEPTH: usize = 128;

/// Largest queue depth a job's slot pool can hold and drain in one acquire
pub const MAX_QUEUE_DEPTH: usize = if Semaphore::MAX_PERMITS < u32::MAX as usize {
    Semaphore::MAX_PERMITS
} else {
    u32::MAX as usize
};

const SETUP_SECTION: &str = "setup";
const TEARDOWN_SECTION: &str = "teardown";
const GLOBAL_SECTION: &str = "global";

/// One named query workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Job {
    pub name: String,
    /// Maximum concurrently in-flight queries
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Target queries per second, 0 for unthrottled
    #[serde(default)]
    pub rate: f64,
    /// Queries released per pacing tick
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Total executions, 0 for unbounded
    #[serde(default)]
    pub count: u64,
    /// Offset from the benchmark start before the first dispatch
    #[serde(default, with = "duration_str")]
    pub start: Duration,
    /// Offset from the benchmark start after which nothing is dispatched, 0 for none
    #[serde(default, with = "duration_str")]
    pub stop: Duration,
    /// Executed round-robin
    pub queries: Vec<String>,
}

fn default_queue_depth() -> usize {
    1
}

fn default_batch_size() -> u64 {
    1
}

impl Job {
    pub fn new(name: impl Into<String>, queries: Vec<String>) -> Self {
        Self {
            name: name.into(),
            queue_depth: default_queue_depth(),
            rate: 0.0,
            batch_size: default_batch_size(),
            count: 0,
            start: Duration::ZERO,
            stop: Duration::ZERO,
            queries,
        }
    }

    pub fn is_paced(&self) -> bool {
        self.rate > 0.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidJob {
            job: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.queries.is_empty() {
            return Err(invalid("no queries"));
        }
        if self.queue_depth == 0 {
            return Err(invalid("queue-depth must be at least 1"));
        }
        if self.queue_depth > MAX_QUEUE_DEPTH {
            return Err(ConfigError::InvalidJob {
                job: self.name.clone(),
                reason: format!("queue-depth must be at most {MAX_QUEUE_DEPTH}"),
            });
        }
        if !self.rate.is_finite() || self.rate < 0.0 {
            return Err(invalid("rate must be a non-negative number"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch-size must be at least 1"));
        }
        if !self.stop.is_zero() && self.stop <= self.start {
            return Err(invalid("stop must be after start"));
        }
        Ok(())
    }
}

/// Everything a benchmark run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub flavor: FlavorKind,
    pub jobs: BTreeMap<String, Job>,
    #[serde(default)]
    pub setup: Vec<String>,
    #[serde(default)]
    pub teardown: Vec<String>,
    /// Upper bound on every job's run time
    #[serde(default, with = "duration_str::option")]
    pub duration: Option<Duration>,
    /// Canonical error codes recorded but not counted as failures
    #[serde(default)]
    pub accepted_errors: BTreeSet<String>,
}

impl Config {
    pub fn new(flavor: FlavorKind) -> Self {
        Self {
            flavor,
            jobs: BTreeMap::new(),
            setup: Vec::new(),
            teardown: Vec::new(),
            duration: None,
            accepted_errors: BTreeSet::new(),
        }
    }

    /// Load a job file, choosing the format by extension.
    ///
    /// `query-file` paths are resolved against `base_dir`.
    pub fn load(path: &Path, flavor: FlavorKind, base_dir: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            let mut config = Self::from_json(&content)?;
            config.flavor = flavor;
            Ok(config)
        } else {
            Self::from_ini(flavor, &content, base_dir)
        }
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_ini(flavor: FlavorKind, content: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        IniParser::new(flavor, base_dir).parse(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs.is_empty() {
            return Err(ConfigError::NoJobs);
        }
        for (name, job) in &self.jobs {
            if name != &job.name {
                return Err(ConfigError::InvalidJob {
                    job: name.clone(),
                    reason: format!("keyed under a different name than `{}`", job.name),
                });
            }
            job.validate()?;
        }
        Ok(())
    }
}

/// Split a query file on `;`, dropping whitespace-only pieces and keeping the rest verbatim
pub fn read_queries<R: Read>(mut reader: R) -> std::io::Result<Vec<String>> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    Ok(content
        .split(';')
        .filter(|q| !q.trim().is_empty())
        .map(str::to_string)
        .collect())
}

/// Parse `1.5s`, `250ms`, `1m30s`, or a bare number of seconds
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let bad = || ConfigError::Duration(s.to_string());
    if s.is_empty() {
        return Err(bad());
    }
    if let Ok(secs) = s.parse::<f64>() {
        return if secs.is_finite() && secs >= 0.0 {
            Ok(Duration::from_nanos((secs * 1e9).round() as u64))
        } else {
            Err(bad())
        };
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(bad)?;
        let (num_part, tail) = rest.split_at(num_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit_part, tail) = tail.split_at(unit_end);

        let value: f64 = num_part.parse().map_err(|_| bad())?;
        let unit_nanos: u64 = match unit_part {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            _ => return Err(bad()),
        };
        total += Duration::from_nanos((value * unit_nanos as f64).round() as u64);
        rest = tail;
    }
    Ok(total)
}

/// Render a duration the way [`parse_duration`] reads it back
pub fn format_duration(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else if d.as_nanos() % 1_000_000 == 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}ns", d.as_nanos())
    }
}

/// Serde adapter storing durations as strings like `"5s"`
mod duration_str {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => s.serialize_some(&format_duration(*d)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// Job section being filled in
#[derive(Default)]
struct JobBuilder {
    queries: Vec<String>,
    queue_depth: Option<usize>,
    rate: Option<f64>,
    batch_size: Option<u64>,
    count: u64,
    start: Duration,
    stop: Duration,
}

enum Section {
    Setup,
    Teardown,
    Job(String, JobBuilder),
}

struct IniParser<'a> {
    base_dir: &'a Path,
    config: Config,
    seen: BTreeSet<String>,
}

impl<'a> IniParser<'a> {
    fn new(flavor: FlavorKind, base_dir: &'a Path) -> Self {
        Self {
            base_dir,
            config: Config::new(flavor),
            seen: BTreeSet::new(),
        }
    }

    fn parse(mut self, content: &str) -> Result<Config, ConfigError> {
        let mut section: Option<Section> = None;

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .ok_or_else(|| ConfigError::Syntax {
                        line: index + 1,
                        message: "unterminated section header".to_string(),
                    })?
                    .trim();
                if let Some(done) = section.take() {
                    self.finish(done)?;
                }
                section = Some(self.open(name)?);
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Syntax {
                line: index + 1,
                message: format!("expected key=value, got `{line}`"),
            })?;
            let (key, value) = (key.trim(), value.trim());

            match section.as_mut() {
                None => self.apply_global(key, value)?,
                Some(Section::Setup) => {
                    let queries = self.queries(SETUP_SECTION, key, value)?;
                    self.config.setup.extend(queries);
                }
                Some(Section::Teardown) => {
                    let queries = self.queries(TEARDOWN_SECTION, key, value)?;
                    self.config.teardown.extend(queries);
                }
                Some(Section::Job(name, builder)) => {
                    let name = name.clone();
                    self.apply_job(&name, builder, key, value)?;
                }
            }
        }

        if let Some(done) = section.take() {
            self.finish(done)?;
        }
        self.config.validate()?;
        Ok(self.config)
    }

    fn open(&mut self, name: &str) -> Result<Section, ConfigError> {
        if !self.seen.insert(name.to_string()) {
            return Err(ConfigError::DuplicateSection(name.to_string()));
        }
        Ok(match name {
            SETUP_SECTION => Section::Setup,
            TEARDOWN_SECTION => Section::Teardown,
            _ => Section::Job(name.to_string(), JobBuilder::default()),
        })
    }

    fn finish(&mut self, section: Section) -> Result<(), ConfigError> {
        let Section::Job(name, builder) = section else {
            return Ok(());
        };

        let rate = builder.rate.unwrap_or(0.0);
        if builder.batch_size.is_some() && rate == 0.0 {
            return Err(ConfigError::InvalidJob {
                job: name,
                reason: "batch-size requires a rate".to_string(),
            });
        }

        let queue_depth = builder.queue_depth.unwrap_or(if rate > 0.0 {
            DEFAULT_PACED_QUEUE_DEPTH
        } else {
            default_queue_depth()
        });

        let job = Job {
            name: name.clone(),
            queue_depth,
            rate,
            batch_size: builder.batch_size.unwrap_or_else(default_batch_size),
            count: builder.count,
            start: builder.start,
            stop: builder.stop,
            queries: builder.queries,
        };
        job.validate()?;
        self.config.jobs.insert(name, job);
        Ok(())
    }

    fn apply_global(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "duration" => {
                self.config.duration = Some(parse_value(GLOBAL_SECTION, key, value, parse_duration)?);
            }
            "error" => {
                self.config.accepted_errors.insert(value.to_string());
            }
            _ => return Err(unknown_key(GLOBAL_SECTION, key)),
        }
        Ok(())
    }

    fn apply_job(
        &self,
        name: &str,
        builder: &mut JobBuilder,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        match key {
            "query" | "query-file" => builder.queries.extend(self.queries(name, key, value)?),
            "queue-depth" => {
                builder.queue_depth = Some(parse_value(name, key, value, |v| v.parse::<usize>())?)
            }
            "rate" => builder.rate = Some(parse_value(name, key, value, |v| v.parse::<f64>())?),
            "batch-size" => {
                builder.batch_size = Some(parse_value(name, key, value, |v| v.parse::<u64>())?)
            }
            "count" => builder.count = parse_value(name, key, value, |v| v.parse::<u64>())?,
            "start" => builder.start = parse_value(name, key, value, parse_duration)?,
            "stop" => builder.stop = parse_value(name, key, value, parse_duration)?,
            _ => return Err(unknown_key(name, key)),
        }
        Ok(())
    }

    fn queries(&self, section: &str, key: &str, value: &str) -> Result<Vec<String>, ConfigError> {
        match key {
            "query" => Ok(vec![value.to_string()]),
            "query-file" => {
                let path = self.base_dir.join(value);
                let file = std::fs::File::open(&path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                read_queries(file).map_err(|source| ConfigError::Io { path, source })
            }
            _ => Err(unknown_key(section, key)),
        }
    }
}

fn unknown_key(section: &str, key: &str) -> ConfigError {
    ConfigError::UnknownKey {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn parse_value<T, E: std::fmt::Display>(
    section: &str,
    key: &str,
    value: &str,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> Result<T, ConfigError> {
    parse(value).map_err(|e| ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
