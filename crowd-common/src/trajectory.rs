use crate::configuration::PrimarySlot;
use crate::error::{CrowdError, Result};
use crate::vecmath::Vec2;
use log::{debug, warn};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Number of values on a per-agent snapshot line: `x y vx vy`.
pub const SNAPSHOT_FIELDS: usize = 4;

/// Position and velocity samples of one agent, aligned with `Trajectory::times`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentSeries {
    pub positions: Vec<Vec2>,
    pub velocities: Vec<Vec2>,
}

/// What the extractor needs to know about the trace before reading it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceLayout {
    /// Agent count declared by the static configuration. When `None`, the
    /// first block fixes it and every later block must match.
    pub agent_count: Option<usize>,
    pub primary: PrimarySlot,
}

/// Per-agent time series reconstructed from a simulator trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub times: Vec<f64>,
    /// Indexed by agent index, in trace order.
    pub agents: Vec<AgentSeries>,
    /// Index of the primary agent in `agents`.
    pub primary: usize,
}

fn malformed(line: usize, reason: impl Into<String>) -> CrowdError {
    CrowdError::MalformedTrace { line, reason: reason.into() }
}

fn parse_value(token: &str, line: usize) -> Result<f64> {
    token
        .parse::<f64>()
        .map_err(|_| malformed(line, format!("'{}' is not a number", token)))
}

/// Tracks how many snapshot lines the current time block has received.
struct Block {
    time: f64,
    seen: usize,
}

impl Trajectory {
    /// Parses alternating time lines (one value) and snapshot lines
    /// (`x y vx vy`). Any other shape fails the whole parse.
    pub fn parse<R: BufRead>(src: R, layout: TraceLayout) -> Result<Self> {
        let mut times: Vec<f64> = Vec::new();
        let mut agents: Vec<AgentSeries> = match layout.agent_count {
            Some(n) => vec![AgentSeries::default(); n],
            None => Vec::new(),
        };
        let mut expected = layout.agent_count;
        let mut block: Option<Block> = None;

        for (idx, line) in src.lines().enumerate() {
            let line_no = idx + 1;
            let line = line?;
            let tokens: Vec<&str> = line.split_whitespace().collect();

            match tokens.len() {
                1 => {
                    if let Some(done) = block.take() {
                        expected = Some(close_block(done, expected, &mut agents)?);
                    }
                    let time = parse_value(tokens[0], line_no)?;
                    if let Some(&last) = times.last() {
                        if time < last {
                            warn!("Trace time goes backwards at line {}: {} after {}", line_no, time, last);
                        }
                    }
                    times.push(time);
                    block = Some(Block { time, seen: 0 });
                }
                SNAPSHOT_FIELDS => {
                    let current = block
                        .as_mut()
                        .ok_or_else(|| malformed(line_no, "snapshot line before the first time line"))?;
                    if let Some(n) = expected {
                        if current.seen >= n {
                            return Err(malformed(
                                line_no,
                                format!("more than {} agents in the block at time {}", n, current.time),
                            ));
                        }
                    } else if current.seen == agents.len() {
                        // First block with no declared count: the series grow with it.
                        agents.push(AgentSeries::default());
                    }
                    let x = parse_value(tokens[0], line_no)?;
                    let y = parse_value(tokens[1], line_no)?;
                    let vx = parse_value(tokens[2], line_no)?;
                    let vy = parse_value(tokens[3], line_no)?;
                    let series = &mut agents[current.seen];
                    series.positions.push(Vec2::new(x, y));
                    series.velocities.push(Vec2::new(vx, vy));
                    current.seen += 1;
                }
                n => {
                    return Err(malformed(
                        line_no,
                        format!("expected 1 or {} values, found {}", SNAPSHOT_FIELDS, n),
                    ))
                }
            }
        }

        let done = block.ok_or_else(|| malformed(0, "trace contains no time steps"))?;
        close_block(done, expected, &mut agents)?;

        let primary = layout
            .primary
            .index(agents.len())
            .ok_or(CrowdError::MissingAgentData { time: times[0], expected: 1, found: 0 })?;

        debug!(
            "Parsed trace: {} time steps, {} agents, primary agent {}",
            times.len(),
            agents.len(),
            primary
        );
        Ok(Self { times, agents, primary })
    }

    /// Opens and parses a trace file.
    pub fn load<P: AsRef<Path>>(path: P, layout: TraceLayout) -> Result<Self> {
        Self::parse(BufReader::new(File::open(path.as_ref())?), layout)
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn primary_series(&self) -> &AgentSeries {
        &self.agents[self.primary]
    }
}

/// Checks a finished block against the expected arity and returns the arity
/// every later block must have.
fn close_block(block: Block, expected: Option<usize>, agents: &mut Vec<AgentSeries>) -> Result<usize> {
    match expected {
        Some(n) if block.seen < n => Err(CrowdError::MissingAgentData {
            time: block.time,
            expected: n,
            found: block.seen,
        }),
        Some(n) => Ok(n),
        None => {
            agents.truncate(block.seen);
            Ok(block.seen)
        }
    }
}
