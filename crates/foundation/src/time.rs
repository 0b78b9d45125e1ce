use serde::{Deserialize, Serialize};

/// ISO week index used as the timeseries key.
pub type Week = u32;

/// The modelled activity season: a closed range of weeks.
///
/// Deserialization goes through [`Season::new`], so the bounds are always
/// ordered.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SeasonBounds")]
pub struct Season {
    pub first_week: Week,
    pub last_week: Week,
}

#[derive(Deserialize)]
struct SeasonBounds {
    first_week: Week,
    last_week: Week,
}

impl From<SeasonBounds> for Season {
    fn from(b: SeasonBounds) -> Self {
        Season::new(b.first_week, b.last_week)
    }
}

impl Default for Season {
    fn default() -> Self {
        Self {
            first_week: 15,
            last_week: 45,
        }
    }
}

impl Season {
    pub fn new(first_week: Week, last_week: Week) -> Self {
        Self {
            first_week: first_week.min(last_week),
            last_week: first_week.max(last_week),
        }
    }

    pub fn weeks(&self) -> std::ops::RangeInclusive<Week> {
        self.first_week..=self.last_week
    }

    pub fn contains(&self, week: Week) -> bool {
        (self.first_week..=self.last_week).contains(&week)
    }

    pub fn clamp(&self, week: Week) -> Week {
        // Fields are public; tolerate a hand-built reversed season.
        week.max(self.first_week).min(self.last_week)
    }

    /// Next week for playback, wrapping back to the first week.
    pub fn next(&self, week: Week) -> Week {
        if week >= self.last_week || week < self.first_week {
            self.first_week
        } else {
            week + 1
        }
    }
}

/// Short month label for a week of the season, `None` outside Apr..Nov.
pub fn month_label(week: Week) -> Option<&'static str> {
    let label = match week {
        15..=18 => "Apr",
        19..=23 => "May",
        24..=27 => "Jun",
        28..=31 => "Jul",
        32..=35 => "Aug",
        36..=39 => "Sep",
        40..=43 => "Oct",
        44..=45 => "Nov",
        _ => return None,
    };
    Some(label)
}
