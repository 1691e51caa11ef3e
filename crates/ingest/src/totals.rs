use usage_core::{UsageEvent, UsageSummary};

/// Look-back window selected by a range label such as `24h` or `7d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    All,
    LastSeconds(i64),
}

impl TimeWindow {
    pub fn parse(label: &str) -> Option<Self> {
        let seconds = match label {
            "1h" => 3_600,
            "3h" => 10_800,
            "6h" => 21_600,
            "12h" => 43_200,
            "24h" => 86_400,
            "30h" => 108_000,
            "48h" => 172_800,
            "7d" => 604_800,
            "14d" => 1_209_600,
            "30d" => 2_592_000,
            "all" => return Some(Self::All),
            _ => return None,
        };
        Some(Self::LastSeconds(seconds))
    }

    pub fn cutoff(self, now_epoch: i64) -> Option<i64> {
        match self {
            Self::All => None,
            Self::LastSeconds(seconds) => Some(now_epoch - seconds),
        }
    }
}

/// Sums every event at or after `cutoff`.
pub fn summarize<'a, I>(events: I, cutoff: Option<i64>) -> UsageSummary
where
    I: IntoIterator<Item = &'a UsageEvent>,
{
    let mut summary = UsageSummary::default();
    for event in events {
        if let Some(cutoff) = cutoff
            && event.ts_epoch < cutoff
        {
            continue;
        }
        summary.add(event);
    }
    summary
}
