//! Serial number allocation.
//!
//! # Responsibility
//! - Render fixed-width serials `<PREFIX><YY><BASE36 BODY><CHECK>`.
//! - Draw values from a persistent named counter so serials stay unique
//!   across restarts and concurrent allocators.
//!
//! # Invariants
//! - Each `allocate` consumes exactly one counter value, or fails.
//! - Rendered serials are always `total_length` characters and pass
//!   [`is_valid_serial`].
//! - A value that needs more base-36 digits than the body holds is an error,
//!   never a wider serial.

use crate::config::SerialConfig;
use crate::model::sequence::{SequenceDefinition, SequenceRecord};
use crate::repo::drone_repo::RepoError;
use crate::repo::sequence_repo::SequenceRepository;
use crate::service::{system_clock, Clock};
use chrono::{DateTime, Datelike, Utc};
use log::{error, info};
use serde_json::json;
use std::error::Error;
use std::fmt::{Display, Formatter};

const BASE36_DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug)]
pub enum AllocationError {
    /// The named counter has not been created.
    SequenceMissing(String),
    /// The counter reached its configured maximum.
    SequenceExhausted { name: String, max_value: Option<i64> },
    /// The value does not fit the serial body.
    CapacityOverflow { value: u64, body_length: usize },
    /// Prefix, year or counter value cannot be rendered.
    InvalidFormat(String),
    Repo(RepoError),
}

impl Display for AllocationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SequenceMissing(name) => write!(f, "sequence `{name}` does not exist"),
            Self::SequenceExhausted { name, max_value } => match max_value {
                Some(max) => write!(f, "sequence `{name}` exhausted at max value {max}"),
                None => write!(f, "sequence `{name}` exhausted"),
            },
            Self::CapacityOverflow { value, body_length } => write!(
                f,
                "serial value {value} does not fit in {body_length} base-36 characters"
            ),
            Self::InvalidFormat(message) => write!(f, "cannot render serial: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AllocationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for AllocationError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Upper-case base-36 rendering without padding.
pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.iter().rev().map(|digit| char::from(*digit)).collect()
}

/// `0-9` map to their value, `A-Z` to `10..=35`. Anything else is rejected.
fn char_value(c: char) -> Option<u32> {
    match c {
        '0'..='9' => Some(c as u32 - '0' as u32),
        'A'..='Z' => Some(c as u32 - 'A' as u32 + 10),
        _ => None,
    }
}

/// Luhn-style check digit over an alphanumeric body.
///
/// Walking from the rightmost character, positions 0, 2, 4, ... are doubled
/// (minus 9 when above 9). Returns `None` if `body` holds a character
/// outside `0-9A-Z`.
///
/// Legacy fleet serials doubled positions 1, 3, 5, ... instead, so their
/// check digits generally do not validate here.
pub fn check_digit(body: &str) -> Option<u8> {
    let mut sum = 0u32;
    for (position, c) in body.chars().rev().enumerate() {
        let mut value = char_value(c)?;
        if position % 2 == 0 {
            value *= 2;
            if value > 9 {
                value -= 9;
            }
        }
        sum += value;
    }
    Some(((10 - sum % 10) % 10) as u8)
}

/// True when the final character is the check digit of everything before it.
pub fn is_valid_serial(serial: &str) -> bool {
    let mut chars = serial.chars();
    let Some(last) = chars.next_back() else {
        return false;
    };
    let Some(expected) = last.to_digit(10) else {
        return false;
    };
    let body = chars.as_str();
    if body.is_empty() {
        return false;
    }
    check_digit(body) == Some(expected as u8)
}

/// Renders one serial from its parts.
pub fn render_serial(
    prefix: &str,
    year: i32,
    value: u64,
    body_length: usize,
) -> Result<String, AllocationError> {
    let encoded = to_base36(value);
    if encoded.len() > body_length {
        return Err(AllocationError::CapacityOverflow { value, body_length });
    }
    let body = format!(
        "{prefix}{year:02}{encoded:0>width$}",
        year = year.rem_euclid(100),
        width = body_length
    );
    let check = check_digit(&body).ok_or_else(|| {
        AllocationError::InvalidFormat(format!("prefix `{prefix}` must be upper-case alphanumeric"))
    })?;
    Ok(format!("{body}{check}"))
}

/// Allocator drawing values from one persistent counter.
pub struct SerialAllocator<S: SequenceRepository> {
    sequences: S,
    config: SerialConfig,
    clock: Clock,
}

impl<S: SequenceRepository> SerialAllocator<S> {
    pub fn new(sequences: S, config: SerialConfig) -> Self {
        Self {
            sequences,
            config,
            clock: system_clock,
        }
    }

    /// Replaces the wall clock; the serial year follows it.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Creates the backing counter if absent. Safe to call on every startup.
    pub fn initialize(&self) -> Result<SequenceRecord, AllocationError> {
        let mut definition =
            SequenceDefinition::new(self.config.sequence_name.clone(), self.config.prefix.clone());
        definition.increment = self.config.increment;
        definition.max_value = self.config.max_value;
        definition.description = Some("Drone serial number counter".to_string());
        definition.metadata = Some(json!({
            "purpose": "drone_serial",
            "version": "1.0",
        }));

        let record = self.sequences.ensure_sequence(&definition, (self.clock)())?;
        info!(
            "event=serial_sequence_init module=serial status=ok name={} current_value={}",
            record.name, record.current_value
        );
        Ok(record)
    }

    /// Consumes the next counter value and renders it for the current year.
    pub fn allocate(&self) -> Result<String, AllocationError> {
        let now = (self.clock)();
        let year = DateTime::<Utc>::from_timestamp_millis(now)
            .map(|at| at.year())
            .ok_or_else(|| AllocationError::InvalidFormat(format!("clock value {now} out of range")))?;
        self.allocate_for_year(year)
    }

    /// Consumes the next counter value and renders it with `year`.
    pub fn allocate_for_year(&self, year: i32) -> Result<String, AllocationError> {
        let name = self.config.sequence_name.as_str();
        let Some(record) = self.sequences.increment(name, (self.clock)())? else {
            let err = match self.sequences.get_sequence(name)? {
                Some(existing) => AllocationError::SequenceExhausted {
                    name: existing.name,
                    max_value: existing.max_value,
                },
                None => AllocationError::SequenceMissing(name.to_string()),
            };
            error!("event=serial_allocate module=serial status=error error={err}");
            return Err(err);
        };

        let value = u64::try_from(record.current_value).map_err(|_| {
            AllocationError::InvalidFormat(format!(
                "counter value {} is negative",
                record.current_value
            ))
        })?;
        let serial = render_serial(&self.config.prefix, year, value, self.config.body_length())
            .map_err(|err| {
                error!("event=serial_allocate module=serial status=error value={value} error={err}");
                err
            })?;
        info!("event=serial_allocate module=serial status=ok serial={serial}");
        Ok(serial)
    }

    /// Last issued counter value, without consuming one.
    pub fn current_value(&self) -> Result<i64, AllocationError> {
        let name = self.config.sequence_name.as_str();
        self.sequences
            .get_sequence(name)?
            .map(|record| record.current_value)
            .ok_or_else(|| AllocationError::SequenceMissing(name.to_string()))
    }
}
