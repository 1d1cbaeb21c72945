//! Read-only access to the dynamic tunable store.
//!
//! Tunables are text-encoded numbers stored under a string key. Controllers
//! only ever read them on a fixed cadence (see [`LiveTune`]) and keep their
//! last good value when a key is missing or does not parse.

use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use log::{debug, warn};
use thiserror::Error;

/// Number of control cycles between two tunable refreshes.
pub const LIVE_TUNE_PERIOD: u32 = 300;

/// Key of the flag enabling live tuning; the flag is on when it reads `1`.
pub const LIVE_TUNE_KEY: &str = "OpkrLiveTune";

/// Errors raised while opening a tunable store.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("Parameter directory {0} does not exist")]
    MissingDir(PathBuf),
}

/// A read-only view of the tunable store.
///
/// Implementations must not block for long and must report any failure as
/// `None`; the caller then keeps its previous value.
pub trait ParamsReader: Debug + Send + Sync {
    /// Returns the raw text stored under `key`.
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory tunable store.
///
/// # Examples
///
/// ```rust
/// use openpilot_lateral::common::params::{MemoryParams, ParamsReader};
///
/// let params = MemoryParams::default();
/// params.put("PidKp", "25");
/// assert_eq!(params.get("PidKp").as_deref(), Some("25"));
/// assert_eq!(params.get("PidKi"), None);
/// ```
#[derive(Debug, Default)]
pub struct MemoryParams {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryParams {
    /// Creates a store holding `pairs`.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_owned(), value.to_owned());
        }
    }

    /// Removes `key` from the store.
    pub fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(key);
        }
    }
}

impl ParamsReader for MemoryParams {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }
}

/// Directory-backed tunable store holding one file per key.
#[derive(Debug, Clone)]
pub struct FileParams {
    dir: PathBuf,
}

impl FileParams {
    /// Opens the store rooted at `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, ParamsError> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(ParamsError::MissingDir(dir));
        }
        Ok(Self { dir })
    }
}

impl ParamsReader for FileParams {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.dir.join(key)).ok()
    }
}

/// Reads `key` as a number and multiplies it by `scale`.
///
/// Returns `None` when the key is missing or is not a finite number.
pub fn read_scaled(params: &dyn ParamsReader, key: &str, scale: f64) -> Option<f64> {
    let raw = params.get(key)?;
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v * scale),
        _ => {
            warn!("Tunable {} has unparseable value {:?}", key, raw);
            None
        }
    }
}

/// Refreshes `value` from `key`, leaving it untouched on failure.
///
/// Returns `true` when the value was updated.
pub fn refresh_scaled(params: &dyn ParamsReader, key: &str, scale: f64, value: &mut f64) -> bool {
    match read_scaled(params, key, scale) {
        Some(v) => {
            *value = v;
            true
        }
        None => {
            debug!("Keeping {} = {} (no fresh value)", key, value);
            false
        }
    }
}

/// Like [`refresh_scaled`], but also rejects values that are not strictly
/// positive. Used for gains the controller divides by.
pub fn refresh_positive(params: &dyn ParamsReader, key: &str, scale: f64, value: &mut f64) -> bool {
    match read_scaled(params, key, scale) {
        Some(v) if v > 0.0 => {
            *value = v;
            true
        }
        Some(v) => {
            warn!("Ignoring non-positive tunable {} = {}", key, v);
            false
        }
        None => false,
    }
}

/// Counts control cycles and reports when a tunable refresh is due.
///
/// The enable flag is itself only read on the refresh cycle, so the store
/// is touched at most once every [`LIVE_TUNE_PERIOD`] cycles.
///
/// # Examples
///
/// ```rust
/// use openpilot_lateral::common::params::{LiveTune, MemoryParams, LIVE_TUNE_PERIOD};
///
/// let params = MemoryParams::from_pairs([("OpkrLiveTune", "1")]);
/// let mut tune = LiveTune::default();
///
/// let due = (0..LIVE_TUNE_PERIOD).filter(|_| tune.tick(&params)).count();
/// assert_eq!(due, 1);
/// ```
#[derive(Debug, Clone)]
pub struct LiveTune {
    frame: u32,
    period: u32,
}

impl LiveTune {
    /// Creates a counter firing every `period` cycles.
    pub fn new(period: u32) -> Self {
        Self {
            frame: 0,
            period: period.max(1),
        }
    }

    /// Advances one cycle; `true` when live tuning is enabled and a refresh
    /// is due on this cycle.
    pub fn tick(&mut self, params: &dyn ParamsReader) -> bool {
        self.frame += 1;
        if self.frame < self.period {
            return false;
        }
        self.frame = 0;
        live_tune_enabled(params)
    }
}

impl Default for LiveTune {
    fn default() -> Self {
        Self::new(LIVE_TUNE_PERIOD)
    }
}

/// Whether the live-tune flag is set in `params`.
pub fn live_tune_enabled(params: &dyn ParamsReader) -> bool {
    matches!(read_scaled(params, LIVE_TUNE_KEY, 1.0), Some(v) if v == 1.0)
}
