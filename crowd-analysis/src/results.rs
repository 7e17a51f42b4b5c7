use crate::metrics::{MetricKind, RunMetrics};
use crowd_common::{CrowdError, Result};
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Formats one run as a results-store block: the heuristic parameter on its
/// own line, then one `<key> <value>` line per metric.
pub fn format_block(run: &RunMetrics) -> String {
    let mut lines = vec![run.heuristic_param.to_string()];
    lines.extend(MetricKind::ALL.into_iter().map(|kind| match kind {
        MetricKind::Collisions => format!("{} {}", kind.key(), run.collision_count),
        _ => format!("{} {}", kind.key(), run.value(kind)),
    }));
    lines.push(String::new());
    lines.join("\n")
}

/// Appends one run to the store, creating the file if needed.
///
/// The block goes out in a single write on an append-mode handle so that
/// concurrent appenders never interleave partial blocks.
pub fn append_run<P: AsRef<Path>>(path: P, run: &RunMetrics) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path.as_ref())?;
    file.write_all(format_block(run).as_bytes())?;
    file.flush()?;
    debug!("Appended run (param {}) to {}", run.heuristic_param, path.as_ref().display());
    Ok(())
}

fn malformed(line: usize, reason: impl Into<String>) -> CrowdError {
    CrowdError::MalformedResults { line, reason: reason.into() }
}

fn parse_value(token: &str, line: usize) -> Result<f64> {
    let value = token
        .parse::<f64>()
        .map_err(|_| malformed(line, format!("'{}' is not a number", token)))?;
    if value.is_nan() {
        return Err(malformed(line, "NaN is not a valid value"));
    }
    Ok(value)
}

/// Partially read block: the parameter plus whichever metrics were seen.
struct PendingRun {
    line: usize,
    param: f64,
    values: [Option<f64>; 4],
}

impl PendingRun {
    fn finish(self) -> Result<RunMetrics> {
        let missing: Vec<&str> = MetricKind::ALL
            .iter()
            .zip(self.values.iter())
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k.key())
            .collect();
        if !missing.is_empty() {
            return Err(malformed(
                self.line,
                format!("run block is missing metric(s) {}", missing.join(", ")),
            ));
        }
        let [t, d, v, c] = self.values.map(|v| v.unwrap_or_default());
        if c < 0.0 || c.fract() != 0.0 {
            return Err(malformed(self.line, format!("collision count {} is not a whole number", c)));
        }
        Ok(RunMetrics {
            heuristic_param: self.param,
            elapsed_time: t,
            distance_travelled: d,
            mean_speed: v,
            collision_count: c as u32,
        })
    }
}

fn slot(kind: MetricKind) -> usize {
    match kind {
        MetricKind::ElapsedTime => 0,
        MetricKind::Distance => 1,
        MetricKind::MeanSpeed => 2,
        MetricKind::Collisions => 3,
    }
}

/// Reads every run block, in file order. Blank lines are ignored.
pub fn read_runs<R: BufRead>(src: R) -> Result<Vec<RunMetrics>> {
    let mut runs = Vec::new();
    let mut pending: Option<PendingRun> = None;

    for (idx, line) in src.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => continue,
            [param] => {
                if let Some(done) = pending.take() {
                    runs.push(done.finish()?);
                }
                pending = Some(PendingRun {
                    line: line_no,
                    param: parse_value(param, line_no)?,
                    values: [None; 4],
                });
            }
            [key, value] => {
                let run = pending
                    .as_mut()
                    .ok_or_else(|| malformed(line_no, "metric line before any heuristic parameter"))?;
                let kind = MetricKind::from_key(key)
                    .ok_or_else(|| malformed(line_no, format!("unknown metric key '{}'", key)))?;
                let cell = &mut run.values[slot(kind)];
                if cell.is_some() {
                    return Err(malformed(line_no, format!("metric '{}' repeated in one run", key)));
                }
                *cell = Some(parse_value(value, line_no)?);
            }
            _ => {
                return Err(malformed(
                    line_no,
                    format!("expected a parameter or '<key> <value>', found {} values", tokens.len()),
                ))
            }
        }
    }
    if let Some(done) = pending {
        runs.push(done.finish()?);
    }
    Ok(runs)
}

/// Loads the whole store. A store that does not exist yet holds no runs.
pub fn load_runs<P: AsRef<Path>>(path: P) -> Result<Vec<RunMetrics>> {
    match File::open(path.as_ref()) {
        Ok(file) => read_runs(BufReader::new(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}
