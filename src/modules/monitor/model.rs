use sqlx::FromRow;
use std::time::Duration;

/// Allowed check intervals, in hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInterval {
    OneHour,
    ThreeHours,
    SixHours,
    TwelveHours,
}

impl CheckInterval {
    pub const ALLOWED_HOURS: [u32; 4] = [1, 3, 6, 12];

    pub fn hours(&self) -> u32 {
        match self {
            Self::OneHour => 1,
            Self::ThreeHours => 3,
            Self::SixHours => 6,
            Self::TwelveHours => 12,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.hours()) * 3600)
    }

    pub fn chrono_duration(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.hours()))
    }
}

impl TryFrom<u32> for CheckInterval {
    type Error = String;

    fn try_from(hours: u32) -> Result<Self, Self::Error> {
        match hours {
            1 => Ok(Self::OneHour),
            3 => Ok(Self::ThreeHours),
            6 => Ok(Self::SixHours),
            12 => Ok(Self::TwelveHours),
            other => Err(format!(
                "interval_hours must be one of: 1, 3, 6, 12 (got {})",
                other
            )),
        }
    }
}

/// What a monitor looks for on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPattern {
    /// CSS selector; matches when at least one node is found
    Selector(String),
    /// Literal fragment searched in the raw content
    Text(String),
}

impl MatchPattern {
    /// Build a pattern from request fields. A non-empty selector wins.
    pub fn from_request(selector: Option<&str>, text: &str) -> Option<Self> {
        match selector.map(str::trim).filter(|s| !s.is_empty()) {
            Some(selector) => Some(Self::Selector(selector.to_string())),
            None if !text.is_empty() => Some(Self::Text(text.to_string())),
            None => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Selector(_) => "selector",
            Self::Text(_) => "text",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Selector(v) | Self::Text(v) => v,
        }
    }

    pub fn selector(&self) -> Option<&str> {
        match self {
            Self::Selector(v) => Some(v),
            Self::Text(_) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            Self::Selector(_) => None,
        }
    }
}

/// Persistent definition of "watch this URL for this pattern on this schedule".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorDefinition {
    pub id: String,
    pub url: String,
    pub pattern: MatchPattern,
    pub interval: CheckInterval,
    pub email_to: String,
    pub email_message: Option<String>,
}

/// Input to the store's create-or-reuse operation.
#[derive(Debug, Clone)]
pub struct NewMonitor {
    pub url: String,
    pub pattern: MatchPattern,
    pub interval: CheckInterval,
    pub email_to: String,
    pub email_message: Option<String>,
}

impl NewMonitor {
    pub fn into_definition(self, id: String) -> MonitorDefinition {
        MonitorDefinition {
            id,
            url: self.url,
            pattern: self.pattern,
            interval: self.interval,
            email_to: self.email_to,
            email_message: self.email_message,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MonitorRow {
    pub id: String,
    pub url: String,
    pub match_kind: String,
    pub match_value: String,
    pub interval_hours: i32,
    pub email_to: String,
    pub email_message: Option<String>,
}

impl TryFrom<MonitorRow> for MonitorDefinition {
    type Error = String;

    fn try_from(row: MonitorRow) -> Result<Self, Self::Error> {
        let pattern = match row.match_kind.as_str() {
            "selector" => MatchPattern::Selector(row.match_value),
            "text" => MatchPattern::Text(row.match_value),
            other => return Err(format!("unknown match kind '{}'", other)),
        };
        let hours = u32::try_from(row.interval_hours)
            .map_err(|_| format!("negative interval {}", row.interval_hours))?;

        Ok(Self {
            id: row.id,
            url: row.url,
            pattern,
            interval: CheckInterval::try_from(hours)?,
            email_to: row.email_to,
            email_message: row.email_message,
        })
    }
}
