//!
//! # Measurement Logs
//!
//! Field-solver results recorded per characterization pattern,
//! in a line-oriented text format:
//!
//! ```text
//! BEGIN <pattern>
//! <comment lines>
//! Charge <net> <value>
//! END
//! ```
//!
//! Logs double as a cache: [MeasurementLog::solve_cached] only invokes the
//! solver for patterns not yet recorded.
//!

// Std-Lib
use std::collections::BTreeMap;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

// Crates.io
use log::{debug, info};
use serde::{Deserialize, Serialize};

// Local imports
use crate::distance::{DistanceSample, Int};
use crate::error::{RcxError, RcxResult, RuleParseContext, RuleParseErrorType};
use crate::read::{Line, RuleLexer};
use crate::utils::{enumstr, EnumStr, SerdeFile};

enumstr!(
    /// # Measurement-Log Keywords
    LogKey {
        Begin: "BEGIN",
        Charge: "Charge",
        End: "END",
    }
);

/// # Net Charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    /// Net reference, e.g. `M2_w3`
    pub net: String,
    pub value: f64,
}
impl Charge {
    pub fn new(net: impl Into<String>, value: f64) -> Self {
        Self {
            net: net.into(),
            value,
        }
    }
}

/// # Capacitance Components
/// Per-unit-length values of a multi-wire pattern's center wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapValues {
    pub coupling: f64,
    pub fringe: f64,
    pub total: f64,
}
impl CapValues {
    /// Convert to a [DistanceSample] at `separation`
    pub fn sample(&self, separation: Int, resistance: f64) -> DistanceSample {
        DistanceSample::new(separation, self.coupling, self.fringe, resistance)
    }
}

/// # Charge Block
/// The solver results for a single pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargeBlock {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    pub charges: Vec<Charge>,
}
impl ChargeBlock {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Default::default()
        }
    }
    /// Add a [Charge]
    pub fn add(&mut self, net: impl Into<String>, value: f64) -> &mut Self {
        self.charges.push(Charge::new(net, value));
        self
    }
    /// Magnitude of the charge on `net`. The last entry wins for repeated nets.
    pub fn charge(&self, net: &str) -> Option<f64> {
        self.charges
            .iter()
            .rev()
            .find(|c| c.net == net)
            .map(|c| c.value.abs())
    }
    ///
    /// Capacitance components of the center wire of a `wire_count`-wire pattern on layer `met`.
    ///
    /// The center wire is `M<met>_w<n>`, with `n = wire_count / 2 + 1`.
    /// Its neighbors `n - 1` and `n + 1` contribute the coupling:
    /// `coupling = (cc1 + cc2) / 2` and `fringe = total - cc1 - cc2`.
    /// Absent neighbors contribute zero. Returns `None` if the center wire is absent.
    ///
    pub fn cap_values(&self, met: usize, wire_count: usize) -> Option<CapValues> {
        let n = wire_count / 2 + 1;
        let name = |k: usize| format!("M{}_w{}", met, k);
        let total = self.charge(&name(n))?;
        let cc1 = match n {
            0 | 1 => 0.0,
            _ => self.charge(&name(n - 1)).unwrap_or(0.0),
        };
        let cc2 = self.charge(&name(n + 1)).unwrap_or(0.0);
        Some(CapValues {
            coupling: (cc1 + cc2) / 2.0,
            fringe: total - cc1 - cc2,
            total,
        })
    }
}

/// # Field Solver
/// External collaborator producing net charges for a characterization pattern.
pub trait FieldSolver {
    fn solve(&mut self, pattern: &str) -> RcxResult<Vec<Charge>>;
}

///
/// # Measurement Log
///
/// [ChargeBlock]s keyed by pattern. Recording a pattern twice keeps the later block.
///
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementLog {
    blocks: BTreeMap<String, ChargeBlock>,
}
impl MeasurementLog {
    pub fn new() -> Self {
        Self::default()
    }
    /// Record `block`, replacing any prior block for its pattern
    pub fn insert(&mut self, block: ChargeBlock) {
        self.blocks.insert(block.pattern.clone(), block);
    }
    pub fn get(&self, pattern: &str) -> Option<&ChargeBlock> {
        self.blocks.get(pattern)
    }
    pub fn contains(&self, pattern: &str) -> bool {
        self.blocks.contains_key(pattern)
    }
    pub fn len(&self) -> usize {
        self.blocks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
    pub fn blocks(&self) -> impl Iterator<Item = &ChargeBlock> {
        self.blocks.values()
    }
    /// Get the results for `pattern`, invoking `solver` only if it is not yet logged
    pub fn solve_cached(&mut self, pattern: &str, solver: &mut impl FieldSolver) -> RcxResult<&ChargeBlock> {
        if self.blocks.contains_key(pattern) {
            debug!("Reusing logged results for {}", pattern);
        } else {
            info!("Solving pattern {}", pattern);
            let charges = solver.solve(pattern)?;
            self.insert(ChargeBlock {
                pattern: pattern.to_string(),
                comments: Vec::new(),
                charges,
            });
        }
        match self.blocks.get(pattern) {
            Some(b) => Ok(b),
            None => RcxError::fail(format!("Pattern {} not recorded", pattern)),
        }
    }
    /// Parse log content `src`
    pub fn parse_str(src: &str) -> RcxResult<Self> {
        LogParser::new(src).parse()
    }
    /// Parse log file `fname`
    pub fn parse_file(fname: impl AsRef<Path>) -> RcxResult<Self> {
        let mut file = std::fs::File::open(fname)?;
        let mut src = String::new();
        file.read_to_string(&mut src)?;
        Self::parse_str(&src)
    }
    /// Write in log format to `dest`
    pub fn write(&self, dest: &mut impl Write) -> RcxResult<()> {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(dest, "# rcx21 measurement log, {}", stamp)?;
        for block in self.blocks.values() {
            writeln!(dest, "{} {}", LogKey::Begin, block.pattern)?;
            for c in block.comments.iter() {
                writeln!(dest, "{}", c)?;
            }
            for c in block.charges.iter() {
                writeln!(dest, "{} {} {}", LogKey::Charge, c.net, c.value)?;
            }
            writeln!(dest, "{}", LogKey::End)?;
        }
        dest.flush()?;
        Ok(())
    }
    /// Write in log format to file `fname`
    pub fn save_log(&self, fname: impl AsRef<Path>) -> RcxResult<()> {
        let mut file = BufWriter::new(std::fs::File::create(fname)?);
        self.write(&mut file)
    }
    /// Write in log format to a [String]
    pub fn to_log_string(&self) -> RcxResult<String> {
        let mut buf: Vec<u8> = Vec::new();
        self.write(&mut buf)?;
        Ok(std::str::from_utf8(&buf)?.to_string())
    }
}
impl SerdeFile for MeasurementLog {}

/// # Measurement-Log Parser
struct LogParser<'src> {
    lex: RuleLexer<'src>,
}
impl<'src> LogParser<'src> {
    fn new(src: &'src str) -> Self {
        Self {
            lex: RuleLexer::with_comments(src),
        }
    }
    fn parse(&mut self) -> RcxResult<MeasurementLog> {
        let mut log = MeasurementLog::new();
        let mut block: Option<ChargeBlock> = None;
        let mut last_line: Option<Line> = None;
        while let Some(line) = self.lex.next_line() {
            let key = line.word(0).and_then(LogKey::from_str);
            match key {
                Some(LogKey::Begin) => {
                    if block.is_some() {
                        return Err(self.error(&line, RuleParseErrorType::InvalidKey, "BEGIN inside block"));
                    }
                    let pattern = line.words[1..].join(" ");
                    if pattern.is_empty() {
                        return Err(self.error(&line, RuleParseErrorType::InvalidValue, "Missing pattern"));
                    }
                    block = Some(ChargeBlock::new(pattern));
                }
                Some(LogKey::End) if block.is_some() => {
                    if let Some(b) = block.take() {
                        log.insert(b);
                    }
                }
                Some(LogKey::Charge) if block.is_some() => {
                    // Net reference first, value last
                    let (net, value) = match (line.word(1), line.words.last()) {
                        (Some(net), Some(val)) if line.words.len() >= 3 => (net, *val),
                        _ => return Err(self.error(&line, RuleParseErrorType::InvalidValue, "Malformed Charge")),
                    };
                    let value = match value.parse::<f64>() {
                        Ok(v) => v,
                        Err(_) => {
                            return Err(self.error(&line, RuleParseErrorType::InvalidValue, "Invalid charge value"))
                        }
                    };
                    if let Some(b) = block.as_mut() {
                        b.add(net, value);
                    }
                }
                _ => {
                    // Comments within blocks are kept, text between blocks dropped
                    if let Some(b) = block.as_mut() {
                        b.comments.push(line.text());
                    }
                }
            }
            last_line = Some(line);
        }
        if let Some(b) = block {
            let line = last_line.unwrap_or(Line {
                num: 0,
                words: Vec::new(),
            });
            return Err(self.error(
                &line,
                RuleParseErrorType::UnexpectedEof,
                format!("Unterminated block {}", b.pattern),
            ));
        }
        Ok(log)
    }
    fn error(&self, line: &Line, tp: RuleParseErrorType, msg: impl Into<String>) -> RcxError {
        RcxError::Parse {
            msg: Some(msg.into()),
            tp,
            line: line.num,
            text: line.text(),
            ctx: vec![RuleParseContext::MeasurementLog],
        }
    }
}
