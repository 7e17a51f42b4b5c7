use crate::error::{CrowdError, Result};
use crate::vecmath::Vec2;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Rectangular arena with a border band agents may not be centered in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    pub width: f64,
    pub height: f64,
    pub border_margin: f64,
}

impl Arena {
    pub fn new(width: f64, height: f64, border_margin: f64) -> Result<Self> {
        if !(width > 0.0 && height > 0.0) {
            return Err(CrowdError::InvalidConfig(format!(
                "arena dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        if !(border_margin >= 0.0) {
            return Err(CrowdError::InvalidConfig(format!(
                "border margin must be non-negative, got {}",
                border_margin
            )));
        }
        if 2.0 * border_margin > width || 2.0 * border_margin > height {
            return Err(CrowdError::InvalidConfig(format!(
                "border margin {} leaves no interior in a {}x{} arena",
                border_margin, width, height
            )));
        }
        Ok(Self { width, height, border_margin })
    }

    /// Inclusive x bounds of the bordered interior.
    pub fn x_range(&self) -> (f64, f64) {
        (self.border_margin, self.width - self.border_margin)
    }

    /// Inclusive y bounds of the bordered interior.
    pub fn y_range(&self) -> (f64, f64) {
        (self.border_margin, self.height - self.border_margin)
    }

    pub fn contains(&self, p: Vec2) -> bool {
        let (x0, x1) = self.x_range();
        let (y0, y1) = self.y_range();
        p.x >= x0 && p.x <= x1 && p.y >= y0 && p.y <= y1
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }
}

/// A circular agent at simulation time 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub radius: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass: Option<f64>,
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Header values the simulator reads in the extended static layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtendedHeader {
    pub comfort_radius: f64,
    pub wall_safety_distance: f64,
    pub pref_speed: f64,
    pub pref_time: f64,
    pub max_speed: f64,
    /// Written as a fourth token on the speed line when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anticipation_time: Option<f64>,
}

/// Layout of the static configuration file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StaticHeader {
    /// `width height`, agent count, then one radius per line.
    Simple,
    /// `width height`, comfort/wall line, speed line, then `radius [mass]` lines.
    Extended(ExtendedHeader),
}

/// Where the primary agent sits in the agent ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimarySlot {
    #[default]
    First,
    Last,
}

impl PrimarySlot {
    /// Resolves the slot against an agent count. `None` for an empty population.
    pub fn index(self, agent_count: usize) -> Option<usize> {
        match (self, agent_count) {
            (_, 0) => None,
            (PrimarySlot::First, _) => Some(0),
            (PrimarySlot::Last, n) => Some(n - 1),
        }
    }
}

impl FromStr for PrimarySlot {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(PrimarySlot::First),
            "last" => Ok(PrimarySlot::Last),
            other => Err(format!("unknown primary slot '{}', expected 'first' or 'last'", other)),
        }
    }
}

impl fmt::Display for PrimarySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimarySlot::First => write!(f, "first"),
            PrimarySlot::Last => write!(f, "last"),
        }
    }
}

/// Per-agent attributes that never change during a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub radius: f64,
    pub mass: Option<f64>,
}

/// Parsed contents of a static configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticRecord {
    pub width: f64,
    pub height: f64,
    pub header: StaticHeader,
    pub bodies: Vec<Body>,
}

/// Parsed contents of a dynamic configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicRecord {
    pub time: f64,
    /// `(position, velocity)` per agent, in static-file order.
    pub states: Vec<(Vec2, Vec2)>,
}

/// A complete initial configuration: arena size, simulator header and agents.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub width: f64,
    pub height: f64,
    pub header: StaticHeader,
    pub agents: Vec<Agent>,
    pub primary: PrimarySlot,
}

impl Configuration {
    pub fn primary_index(&self) -> Option<usize> {
        self.primary.index(self.agents.len())
    }

    pub fn primary_agent(&self) -> Option<&Agent> {
        self.primary_index().map(|i| &self.agents[i])
    }

    pub fn radii(&self) -> Vec<f64> {
        self.agents.iter().map(|a| a.radius).collect()
    }

    /// Writes the static file: arena size, header lines, then `radius [mass]` per agent.
    pub fn write_static<W: Write>(&self, mut w: W) -> Result<()> {
        writeln!(w, "{} {}", self.width, self.height)?;
        match &self.header {
            StaticHeader::Simple => writeln!(w, "{}", self.agents.len())?,
            StaticHeader::Extended(h) => {
                writeln!(w, "{} {}", h.comfort_radius, h.wall_safety_distance)?;
                match h.anticipation_time {
                    Some(a) => writeln!(w, "{} {} {} {}", h.pref_speed, h.pref_time, h.max_speed, a)?,
                    None => writeln!(w, "{} {} {}", h.pref_speed, h.pref_time, h.max_speed)?,
                }
            }
        }
        for agent in &self.agents {
            match agent.mass {
                Some(m) => writeln!(w, "{} {}", agent.radius, m)?,
                None => writeln!(w, "{}", agent.radius)?,
            }
        }
        w.flush()?;
        Ok(())
    }

    /// Writes the dynamic file: time `0`, then `x y vx vy` per agent.
    pub fn write_dynamic<W: Write>(&self, mut w: W) -> Result<()> {
        writeln!(w, "0")?;
        for agent in &self.agents {
            writeln!(
                w,
                "{} {} {} {}",
                agent.position.x, agent.position.y, agent.velocity.x, agent.velocity.y
            )?;
        }
        w.flush()?;
        Ok(())
    }

    /// Writes both interchange files.
    pub fn save<P: AsRef<Path>, Q: AsRef<Path>>(&self, static_path: P, dynamic_path: Q) -> Result<()> {
        self.write_static(BufWriter::new(File::create(static_path.as_ref())?))?;
        self.write_dynamic(BufWriter::new(File::create(dynamic_path.as_ref())?))?;
        debug!(
            "Wrote {} agents to '{}' and '{}'",
            self.agents.len(),
            static_path.as_ref().display(),
            dynamic_path.as_ref().display()
        );
        Ok(())
    }

    /// Rebuilds a configuration from its static and dynamic files.
    pub fn read<S: BufRead, D: BufRead>(static_src: S, dynamic_src: D, primary: PrimarySlot) -> Result<Self> {
        let record = StaticRecord::read(static_src)?;
        let dynamic = DynamicRecord::read(dynamic_src, record.bodies.len())?;
        let agents = record
            .bodies
            .iter()
            .zip(dynamic.states.iter())
            .map(|(body, &(position, velocity))| Agent {
                radius: body.radius,
                mass: body.mass,
                position,
                velocity,
            })
            .collect();
        Ok(Self {
            width: record.width,
            height: record.height,
            header: record.header,
            agents,
            primary,
        })
    }

    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(static_path: P, dynamic_path: Q, primary: PrimarySlot) -> Result<Self> {
        let static_src = BufReader::new(File::open(static_path.as_ref())?);
        let dynamic_src = BufReader::new(File::open(dynamic_path.as_ref())?);
        Self::read(static_src, dynamic_src, primary)
    }
}

/// Non-blank lines of a configuration file, tokenized, with 1-based line numbers.
fn tokenized_lines<R: BufRead>(src: R) -> Result<Vec<(usize, Vec<String>)>> {
    let mut out = Vec::new();
    for (idx, line) in src.lines().enumerate() {
        let line = line?;
        let tokens: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
        if !tokens.is_empty() {
            out.push((idx + 1, tokens));
        }
    }
    Ok(out)
}

fn malformed(line: usize, reason: impl Into<String>) -> CrowdError {
    CrowdError::MalformedConfiguration { line, reason: reason.into() }
}

fn parse_number(token: &str, line: usize) -> Result<f64> {
    token
        .parse::<f64>()
        .map_err(|_| malformed(line, format!("'{}' is not a number", token)))
}

fn parse_numbers(tokens: &[String], line: usize) -> Result<Vec<f64>> {
    tokens.iter().map(|t| parse_number(t, line)).collect()
}

fn parse_body(tokens: &[String], line: usize) -> Result<Body> {
    let values = parse_numbers(tokens, line)?;
    let (radius, mass) = match values.as_slice() {
        [r] => (*r, None),
        [r, m] => (*r, Some(*m)),
        _ => return Err(malformed(line, format!("expected 'radius [mass]', found {} values", values.len()))),
    };
    if !(radius > 0.0) {
        return Err(malformed(line, format!("radius must be positive, got {}", radius)));
    }
    if let Some(m) = mass {
        if !(m > 0.0) {
            return Err(malformed(line, format!("mass must be positive, got {}", m)));
        }
    }
    Ok(Body { radius, mass })
}

impl StaticRecord {
    /// Parses a static file, detecting the layout from the token count of its second line.
    pub fn read<R: BufRead>(src: R) -> Result<Self> {
        let lines = tokenized_lines(src)?;
        let mut iter = lines.iter();

        let (line_no, tokens) = iter.next().ok_or_else(|| malformed(1, "empty static file"))?;
        let (width, height) = match parse_numbers(tokens, *line_no)?.as_slice() {
            [w, h] => (*w, *h),
            _ => return Err(malformed(*line_no, "expected 'width height'")),
        };
        if !(width > 0.0 && height > 0.0) {
            return Err(malformed(*line_no, format!("arena dimensions must be positive, got {}x{}", width, height)));
        }

        let (line_no, tokens) = iter.next().ok_or_else(|| malformed(line_no + 1, "missing header line"))?;
        let header = match tokens.len() {
            1 => StaticHeader::Simple,
            2 => {
                let values = parse_numbers(tokens, *line_no)?;
                let (speed_line, speed_tokens) = iter
                    .next()
                    .ok_or_else(|| malformed(line_no + 1, "missing speed line"))?;
                let speeds = parse_numbers(speed_tokens, *speed_line)?;
                let (pref_speed, pref_time, max_speed, anticipation_time) = match speeds.as_slice() {
                    [ps, pt, ms] => (*ps, *pt, *ms, None),
                    [ps, pt, ms, at] => (*ps, *pt, *ms, Some(*at)),
                    _ => {
                        return Err(malformed(
                            *speed_line,
                            "expected 'pref_speed pref_time max_speed [anticipation_time]'",
                        ))
                    }
                };
                StaticHeader::Extended(ExtendedHeader {
                    comfort_radius: values[0],
                    wall_safety_distance: values[1],
                    pref_speed,
                    pref_time,
                    max_speed,
                    anticipation_time,
                })
            }
            n => return Err(malformed(*line_no, format!("header line has {} values, expected 1 or 2", n))),
        };

        let declared = match header {
            StaticHeader::Simple => {
                let count = tokens[0]
                    .parse::<usize>()
                    .map_err(|_| malformed(*line_no, format!("'{}' is not an agent count", tokens[0])))?;
                Some(count)
            }
            StaticHeader::Extended(_) => None,
        };

        let bodies = iter
            .map(|(line_no, tokens)| parse_body(tokens, *line_no))
            .collect::<Result<Vec<_>>>()?;

        if let Some(count) = declared {
            if count != bodies.len() {
                return Err(malformed(
                    lines.last().map_or(1, |(n, _)| *n),
                    format!("declared {} agents but found {}", count, bodies.len()),
                ));
            }
        }

        debug!("Parsed static record: {}x{} arena, {} agents", width, height, bodies.len());
        Ok(Self { width, height, header, bodies })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read(BufReader::new(File::open(path.as_ref())?))
    }

    pub fn radii(&self) -> Vec<f64> {
        self.bodies.iter().map(|b| b.radius).collect()
    }
}

impl DynamicRecord {
    /// Parses a dynamic file holding exactly `expected` agent lines after the time line.
    pub fn read<R: BufRead>(src: R, expected: usize) -> Result<Self> {
        let lines = tokenized_lines(src)?;
        let mut iter = lines.iter();

        let (line_no, tokens) = iter.next().ok_or_else(|| malformed(1, "empty dynamic file"))?;
        let time = match tokens.as_slice() {
            [t] => parse_number(t, *line_no)?,
            _ => return Err(malformed(*line_no, "expected a single time value")),
        };

        let mut states = Vec::with_capacity(expected);
        for (line_no, tokens) in iter {
            if states.len() == expected {
                return Err(malformed(*line_no, format!("more than {} agent lines", expected)));
            }
            match parse_numbers(tokens, *line_no)?.as_slice() {
                [x, y, vx, vy] => states.push((Vec2::new(*x, *y), Vec2::new(*vx, *vy))),
                _ => return Err(malformed(*line_no, "expected 'x y vx vy'")),
            }
        }
        if states.len() < expected {
            return Err(CrowdError::MissingAgentData { time, expected, found: states.len() });
        }
        Ok(Self { time, states })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample(header: StaticHeader) -> Configuration {
        Configuration {
            width: 100.0,
            height: 50.0,
            header,
            agents: vec![
                Agent { radius: 2.0, mass: Some(70.0), position: Vec2::new(5.0, 25.0), velocity: Vec2::zero() },
                Agent { radius: 1.0, mass: Some(70.0), position: Vec2::new(42.125, 7.3), velocity: Vec2::new(0.0, -1.5) },
                Agent { radius: 1.0, mass: Some(70.0), position: Vec2::new(0.1, 0.2), velocity: Vec2::new(0.0, 1.5) },
            ],
            primary: PrimarySlot::First,
        }
    }

    fn extended() -> StaticHeader {
        StaticHeader::Extended(ExtendedHeader {
            comfort_radius: 0.5,
            wall_safety_distance: 0.3,
            pref_speed: 1.3,
            pref_time: 0.5,
            max_speed: 2.0,
            anticipation_time: None,
        })
    }

    fn round_trip(config: &Configuration) -> Configuration {
        let mut st = Vec::new();
        let mut dy = Vec::new();
        config.write_static(&mut st).unwrap();
        config.write_dynamic(&mut dy).unwrap();
        Configuration::read(Cursor::new(st), Cursor::new(dy), config.primary).unwrap()
    }

    #[test]
    fn extended_layout_round_trips() {
        let config = sample(extended());
        assert_eq!(round_trip(&config), config);
    }

    #[test]
    fn anticipation_time_is_a_fourth_speed_token() {
        let mut config = sample(extended());
        if let StaticHeader::Extended(h) = &mut config.header {
            h.anticipation_time = Some(2.5);
        }
        let mut st = Vec::new();
        config.write_static(&mut st).unwrap();
        let text = String::from_utf8(st).unwrap();
        assert_eq!(text.lines().nth(2), Some("1.3 0.5 2 2.5"));
        assert_eq!(round_trip(&config), config);
    }

    #[test]
    fn simple_layout_round_trips_without_mass() {
        let mut config = sample(StaticHeader::Simple);
        for a in &mut config.agents {
            a.mass = None;
        }
        let mut st = Vec::new();
        config.write_static(&mut st).unwrap();
        let text = String::from_utf8(st).unwrap();
        assert_eq!(text, "100 50\n3\n2\n1\n1\n");
        assert_eq!(round_trip(&config), config);
    }

    #[test]
    fn dynamic_file_starts_at_time_zero() {
        let mut dy = Vec::new();
        sample(extended()).write_dynamic(&mut dy).unwrap();
        let text = String::from_utf8(dy).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("0"));
        assert_eq!(lines.next(), Some("5 25 0 0"));
        assert_eq!(lines.next(), Some("42.125 7.3 0 -1.5"));
    }

    #[test]
    fn short_dynamic_file_is_missing_agent_data() {
        let st = "10 10\n0.5 0.3\n1 1 1\n1\n1\n";
        let dy = "0\n1 1 0 0\n";
        let err = Configuration::read(Cursor::new(st), Cursor::new(dy), PrimarySlot::First).unwrap_err();
        assert!(matches!(err, CrowdError::MissingAgentData { expected: 2, found: 1, .. }));
    }

    #[test]
    fn extra_dynamic_lines_are_rejected() {
        let st = "10 10\n0.5 0.3\n1 1 1\n1\n";
        let dy = "0\n1 1 0 0\n2 2 0 0\n";
        let err = Configuration::read(Cursor::new(st), Cursor::new(dy), PrimarySlot::First).unwrap_err();
        assert!(matches!(err, CrowdError::MalformedConfiguration { line: 3, .. }));
    }

    #[test]
    fn simple_layout_count_must_match() {
        let err = StaticRecord::read(Cursor::new("10 10\n3\n1\n1\n")).unwrap_err();
        assert!(matches!(err, CrowdError::MalformedConfiguration { .. }));
    }

    #[test]
    fn non_positive_radius_is_rejected() {
        let err = StaticRecord::read(Cursor::new("10 10\n1\n0\n")).unwrap_err();
        assert!(matches!(err, CrowdError::MalformedConfiguration { line: 3, .. }));
    }

    #[test]
    fn save_and_load_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let st = dir.path().join("static.txt");
        let dy = dir.path().join("dynamic.txt");
        let config = sample(extended());
        config.save(&st, &dy).unwrap();
        let loaded = Configuration::load(&st, &dy, PrimarySlot::First).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(StaticRecord::load(&st).unwrap().radii(), vec![2.0, 1.0, 1.0]);
    }

    #[test]
    fn primary_slot_resolution() {
        assert_eq!(PrimarySlot::First.index(4), Some(0));
        assert_eq!(PrimarySlot::Last.index(4), Some(3));
        assert_eq!(PrimarySlot::Last.index(0), None);
        assert_eq!("LAST".parse::<PrimarySlot>(), Ok(PrimarySlot::Last));
        assert!("middle".parse::<PrimarySlot>().is_err());
    }

    #[test]
    fn arena_interior() {
        let arena = Arena::new(100.0, 50.0, 5.0).unwrap();
        assert!(arena.contains(Vec2::new(5.0, 45.0)));
        assert!(!arena.contains(Vec2::new(4.9, 25.0)));
        assert!(Arena::new(10.0, 10.0, 6.0).is_err());
        assert!(Arena::new(0.0, 10.0, 0.0).is_err());
    }
}
