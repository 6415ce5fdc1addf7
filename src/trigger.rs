use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Invalid cron expression: {0}")]
    InvalidExpression(String),
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
    #[error("Invalid trigger spec: {0}")]
    InvalidSpec(String),
    #[error("Cron parsing error: {0}")]
    ParseError(#[from] cron::error::Error),
}

/// When a recurring job should fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Every hour at the given minute.
    Hourly { minute: u32 },
    /// Every day at each of the given hours, at the given minute.
    DailyAtHours { hours: Vec<u32>, minute: u32 },
}

impl TriggerSpec {
    pub fn validate(&self) -> Result<(), TriggerError> {
        match self {
            TriggerSpec::Hourly { minute } => {
                if *minute > 59 {
                    return Err(TriggerError::InvalidSpec(format!(
                        "minute must be 0-59, got {}",
                        minute
                    )));
                }
            }
            TriggerSpec::DailyAtHours { hours, minute } => {
                if *minute > 59 {
                    return Err(TriggerError::InvalidSpec(format!(
                        "minute must be 0-59, got {}",
                        minute
                    )));
                }
                if hours.is_empty() {
                    return Err(TriggerError::InvalidSpec(
                        "daily trigger needs at least one hour".to_string(),
                    ));
                }
                if let Some(bad) = hours.iter().find(|h| **h > 23) {
                    return Err(TriggerError::InvalidSpec(format!(
                        "hour must be 0-23, got {}",
                        bad
                    )));
                }
            }
        }
        Ok(())
    }

    /// Render this trigger spec as a six-field cron expression (seconds first).
    pub fn expression(&self) -> String {
        match self {
            TriggerSpec::Hourly { minute } => format!("0 {} * * * *", minute),
            TriggerSpec::DailyAtHours { hours, minute } => {
                let mut hours = hours.clone();
                hours.sort_unstable();
                hours.dedup();
                let hours = hours
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                format!("0 {} {} * * *", minute, hours)
            }
        }
    }
}

/// A compiled recurring trigger with timezone support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub spec: TriggerSpec,
    pub timezone: String,
    #[serde(skip)]
    schedule: Option<Schedule>,
    #[serde(skip)]
    tz: Option<Tz>,
}

impl Trigger {
    /// Compile a spec in the UTC timezone.
    pub fn new(spec: TriggerSpec) -> Result<Self, TriggerError> {
        Self::with_timezone(spec, "UTC")
    }

    /// Compile a spec in a specific IANA timezone.
    pub fn with_timezone(spec: TriggerSpec, timezone: &str) -> Result<Self, TriggerError> {
        spec.validate()?;

        let expression = spec.expression();
        let schedule = Schedule::from_str(&expression)
            .map_err(|e| TriggerError::InvalidExpression(format!("{}: {}", expression, e)))?;

        let tz = timezone
            .parse::<Tz>()
            .map_err(|_| TriggerError::InvalidTimezone(timezone.to_string()))?;

        Ok(Trigger {
            spec,
            timezone: timezone.to_string(),
            schedule: Some(schedule),
            tz: Some(tz),
        })
    }

    /// Every hour at `minute`, in UTC.
    pub fn hourly(minute: u32) -> Result<Self, TriggerError> {
        Self::new(TriggerSpec::Hourly { minute })
    }

    /// Every day at each hour in `hours`, at `minute`, in UTC.
    pub fn daily_at_hours(hours: &[u32], minute: u32) -> Result<Self, TriggerError> {
        Self::new(TriggerSpec::DailyAtHours {
            hours: hours.to_vec(),
            minute,
        })
    }

    /// Get the next fire time strictly after the given datetime.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let schedule = self.schedule.as_ref()?;
        let tz = self.tz.as_ref()?;

        // Evaluate the cron in its own timezone, then convert back to UTC
        let after_tz = after.with_timezone(tz);
        let next_tz = schedule.after(&after_tz).next()?;
        Some(next_tz.with_timezone(&Utc))
    }

    /// Get the next fire time from now.
    pub fn next_fire_from_now(&self) -> Option<DateTime<Utc>> {
        self.next_fire(Utc::now())
    }

    pub fn expression(&self) -> String {
        self.spec.expression()
    }

    /// Reinitialize the compiled schedule and timezone after deserialization.
    pub fn reinitialize(&mut self) -> Result<(), TriggerError> {
        let expression = self.spec.expression();
        self.schedule = Some(
            Schedule::from_str(&expression)
                .map_err(|e| TriggerError::InvalidExpression(format!("{}: {}", expression, e)))?,
        );

        self.tz = Some(
            self.timezone
                .parse::<Tz>()
                .map_err(|_| TriggerError::InvalidTimezone(self.timezone.clone()))?,
        );

        Ok(())
    }
}

/// Check that a timezone string names a valid IANA timezone.
pub fn validate_timezone(timezone: &str) -> Result<(), TriggerError> {
    timezone
        .parse::<Tz>()
        .map(|_| ())
        .map_err(|_| TriggerError::InvalidTimezone(timezone.to_string()))
}
