use serde::{Deserialize, Serialize};

/// Time window in milliseconds, relative to stimulus onset unless noted otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct WindowMs {
    pub start: f64,
    pub end: f64,
}

impl WindowMs {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn start_s(&self) -> f64 {
        self.start / 1000.0
    }

    pub fn end_s(&self) -> f64 {
        self.end / 1000.0
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.start, self.end)
    }

    pub fn is_valid(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.start < self.end
    }

    /// Half-open sample range `[first t >= start, first t >= end)` on a sorted time axis,
    /// with the window shifted by `offset_s` seconds.
    pub fn index_range(&self, time: &[f64], offset_s: f64) -> std::ops::Range<usize> {
        let lo = search_sorted(time, offset_s + self.start_s());
        let hi = search_sorted(time, offset_s + self.end_s());
        lo..hi.max(lo)
    }
}

impl From<(f64, f64)> for WindowMs {
    fn from((start, end): (f64, f64)) -> Self {
        Self { start, end }
    }
}

impl From<WindowMs> for (f64, f64) {
    fn from(w: WindowMs) -> Self {
        (w.start, w.end)
    }
}

/// Index of the first element `>= value` in an ascending slice.
pub fn search_sorted(sorted: &[f64], value: f64) -> usize {
    sorted.partition_point(|&t| t < value)
}

/// One recorded sweep (or one averaged trace living in the tidy table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    pub stim_intensity: f64,
    /// Acquisition order within the recording (0-based)
    pub sweep_index: usize,
    /// Repetition within the stimulus group (1..=repnum)
    pub repetition: usize,
    /// Seconds
    pub time: Vec<f64>,
    /// mV
    pub voltage: Vec<f64>,
    /// Standard error of the mean, present once sweeps have been averaged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sem: Option<Vec<f64>>,
    #[serde(default = "one")]
    pub n_sweeps: usize,
}

fn one() -> usize {
    1
}

impl Sweep {
    pub fn new(stim_intensity: f64, sweep_index: usize, time: Vec<f64>, voltage: Vec<f64>) -> Self {
        Self {
            stim_intensity,
            sweep_index,
            repetition: 1,
            time,
            voltage,
            sem: None,
            n_sweeps: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.voltage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltage.is_empty()
    }

    pub fn with_voltage(&self, voltage: Vec<f64>) -> Self {
        Self {
            voltage,
            ..self.clone()
        }
    }

    pub fn same_time_axis(&self, other: &Sweep) -> bool {
        self.time.len() == other.time.len()
            && self
                .time
                .iter()
                .zip(&other.time)
                .all(|(a, b)| (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0))
    }
}

/// Row of the tidy long-format view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TidyRow {
    pub stim_intensity: f64,
    pub sweep_index: usize,
    pub repetition: usize,
    pub time: f64,
    pub voltage: f64,
}

/// All sweeps of one recording, in acquisition order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TidyTable {
    pub sweeps: Vec<Sweep>,
}

impl TidyTable {
    pub fn new(sweeps: Vec<Sweep>) -> Self {
        Self { sweeps }
    }

    pub fn is_empty(&self) -> bool {
        self.sweeps.is_empty()
    }

    /// Distinct stimulus intensities in first-seen order
    pub fn intensities(&self) -> Vec<f64> {
        let mut seen: Vec<f64> = Vec::new();
        for sweep in &self.sweeps {
            if !seen.contains(&sweep.stim_intensity) {
                seen.push(sweep.stim_intensity);
            }
        }
        seen
    }

    /// Sweeps grouped by stimulus intensity, groups in first-seen order.
    pub fn groups(&self) -> Vec<(f64, Vec<&Sweep>)> {
        self.intensities()
            .into_iter()
            .map(|stim| {
                let members = self
                    .sweeps
                    .iter()
                    .filter(|s| s.stim_intensity == stim)
                    .collect();
                (stim, members)
            })
            .collect()
    }

    pub fn max_group_size(&self) -> usize {
        self.groups().iter().map(|(_, g)| g.len()).max().unwrap_or(0)
    }

    pub fn rows(&self) -> Vec<TidyRow> {
        self.sweeps
            .iter()
            .flat_map(|s| {
                s.time.iter().zip(&s.voltage).map(move |(&t, &v)| TidyRow {
                    stim_intensity: s.stim_intensity,
                    sweep_index: s.sweep_index,
                    repetition: s.repetition,
                    time: t,
                    voltage: v,
                })
            })
            .collect()
    }

    /// Rebuild sweeps from long-format rows. Rows of one sweep need not be contiguous;
    /// samples within a sweep are ordered by time.
    pub fn from_rows(rows: &[TidyRow]) -> Self {
        let mut sweeps: Vec<Sweep> = Vec::new();
        for row in rows {
            match sweeps.iter_mut().find(|s| {
                s.sweep_index == row.sweep_index && s.stim_intensity == row.stim_intensity
            }) {
                Some(sweep) => {
                    sweep.time.push(row.time);
                    sweep.voltage.push(row.voltage);
                }
                None => sweeps.push(Sweep {
                    repetition: row.repetition,
                    ..Sweep::new(
                        row.stim_intensity,
                        row.sweep_index,
                        vec![row.time],
                        vec![row.voltage],
                    )
                }),
            }
        }
        for sweep in &mut sweeps {
            let mut pairs: Vec<(f64, f64)> = sweep
                .time
                .iter()
                .copied()
                .zip(sweep.voltage.iter().copied())
                .collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
            sweep.time = pairs.iter().map(|p| p.0).collect();
            sweep.voltage = pairs.iter().map(|p| p.1).collect();
        }
        sweeps.sort_by_key(|s| s.sweep_index);
        Self { sweeps }
    }
}

/// Sweep-averaged signal for one stimulus group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragedTrace {
    pub stim_intensity: f64,
    pub time: Vec<f64>,
    pub mean: Vec<f64>,
    pub sem: Vec<f64>,
    pub n_sweeps: usize,
}

impl AveragedTrace {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AveragedTable {
    pub traces: Vec<AveragedTrace>,
}

impl AveragedTable {
    pub fn get(&self, stim_intensity: f64) -> Option<&AveragedTrace> {
        self.traces.iter().find(|t| t.stim_intensity == stim_intensity)
    }

    /// Convert a table holding at most one sweep per group. Callers average first.
    pub(crate) fn from_single_sweeps(tidy: &TidyTable) -> Self {
        let traces = tidy
            .sweeps
            .iter()
            .map(|s| AveragedTrace {
                stim_intensity: s.stim_intensity,
                time: s.time.clone(),
                mean: s.voltage.clone(),
                sem: s
                    .sem
                    .clone()
                    .unwrap_or_else(|| vec![f64::NAN; s.voltage.len()]),
                n_sweeps: s.n_sweeps,
            })
            .collect();
        Self { traces }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_range_half_open() {
        let time: Vec<f64> = (0..10).map(|i| i as f64 * 0.0001).collect();
        let window = WindowMs::new(0.2, 0.5);
        assert_eq!(window.index_range(&time, 0.0), 2..5);
        assert_eq!(WindowMs::new(5.0, 6.0).index_range(&time, 0.0), 10..10);
    }

    #[test]
    fn test_window_deserializes_from_pair() {
        let w: WindowMs = serde_json::from_str("[1.5, 3.0]").unwrap();
        assert_eq!(w, WindowMs::new(1.5, 3.0));
    }

    #[test]
    fn test_rows_round_trip_preserves_sweeps() {
        let table = TidyTable::new(vec![
            Sweep::new(25.0, 0, vec![0.0, 0.001], vec![1.0, 2.0]),
            Sweep {
                repetition: 2,
                ..Sweep::new(25.0, 1, vec![0.0, 0.001], vec![3.0, 4.0])
            },
        ]);
        let rows = table.rows();
        assert_eq!(rows[2].repetition, 2);
        let rebuilt = TidyTable::from_rows(&rows);
        assert_eq!(rebuilt, table);
        assert_eq!(rebuilt.sweeps[1].repetition, 2);
    }
}
