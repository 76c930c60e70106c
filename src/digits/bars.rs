use super::window::DIGIT_BUCKETS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarClass {
    Min,
    Max,
    Neutral,
}

impl BarClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarClass::Min => "min",
            BarClass::Max => "max",
            BarClass::Neutral => "",
        }
    }
}

/// Renderable summary of one digit bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub digit: u8,
    pub count: u32,
    pub height_pct: f64,
    pub class: BarClass,
}

impl Bar {
    pub fn empty(digit: u8) -> Self {
        Self {
            digit,
            count: 0,
            height_pct: 0.0,
            class: BarClass::Neutral,
        }
    }
}

/// Derive the ten bars from raw counts.
///
/// Height is `count * 100 / capacity`, measured against the full window
/// capacity rather than the current fill. The min check runs before the max
/// check, so a uniform histogram classifies every digit as `Min`.
pub fn derive_bars(counts: &[u32; DIGIT_BUCKETS], capacity: usize) -> Vec<Bar> {
    let min = counts.iter().copied().min().unwrap_or(0);
    let max = counts.iter().copied().max().unwrap_or(0);
    let capacity = capacity.max(1) as f64;

    counts
        .iter()
        .enumerate()
        .map(|(digit, &count)| {
            let class = if count == min {
                BarClass::Min
            } else if count == max {
                BarClass::Max
            } else {
                BarClass::Neutral
            };
            Bar {
                digit: digit as u8,
                count,
                height_pct: count as f64 * 100.0 / capacity,
                class,
            }
        })
        .collect()
}

/// Neutral placeholder bars shown before any data exists.
pub fn empty_bars() -> Vec<Bar> {
    (0..DIGIT_BUCKETS as u8).map(Bar::empty).collect()
}
