//!
//! # Rule-File Reading Module
//!
//! Facilities for reading extraction rule files from file or string.
//! Includes the line-oriented [RuleLexer] and the [RuleParser].
//!

// Std-Lib
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

// Crates.io
use log::{debug, info, warn};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

// Local imports
use crate::corner::{CornerModel, DiagModel, RcModel, RuleOptions};
use crate::distance::{DistanceSample, Int};
use crate::error::{RcxError, RcxResult, RuleParseContext, RuleParseErrorType};
use crate::relation::{index_over_under, is_applicable, relation_count, RelationKind, DIAG_LAYER_SPAN};
use crate::utils::{enumstr, EnumStr, ErrorHelper, Unwrapper};
use crate::width::WidthIndexedTable;

/// Parse rule-file content from file `fname`
pub fn parse_file(fname: impl AsRef<Path>, options: &RuleOptions) -> RcxResult<RcModel> {
    let mut file = std::fs::File::open(fname)?;
    let mut src = String::new();
    file.read_to_string(&mut src)?;
    parse_str(&src, options)
}
/// Parse rule-file content `src` from string
pub fn parse_str(src: &str, options: &RuleOptions) -> RcxResult<RcModel> {
    let mut parser = RuleParser::new(src, options.clone());
    parser.parse_model()
}

enumstr!(
    /// # Rule-File Keywords
    RuleKey {
        Extraction: "Extraction",
        DiagModel: "DIAGMODEL",
        ReverseOrder: "OUREVERSEORDER",
        LayerCount: "LayerCount",
        DensityRate: "DensityRate",
        DensityModel: "DensityModel",
        Metal: "Metal",
        Width: "WIDTH",
        DiagWidth: "DIAG_WIDTH",
        DiagDist: "DIAG_DIST",
        Dist: "DIST",
        End: "END",
        Table: "Table",
        Entries: "entries:",
        Count: "count",
        TableCount: "Count:",
        WidthParam: "width",
        DiagWidthParam: "diag_width",
        DiagDistParam: "diag_dist",
        Over: "OVER",
        Under: "UNDER",
        On: "ON",
        True: "TRUE",
        Off: "OFF",
    }
);

/// # Source Line
/// A non-empty line of whitespace-separated words.
#[derive(Debug, Clone, PartialEq)]
pub struct Line<'src> {
    /// Line number, one-based
    pub num: usize,
    pub words: Vec<&'src str>,
}
impl<'src> Line<'src> {
    /// Word at index `idx`, if present
    pub fn word(&self, idx: usize) -> Option<&'src str> {
        self.words.get(idx).copied()
    }
    /// Boolean indication of whether the first word is `key`
    pub fn starts_with(&self, key: RuleKey) -> bool {
        self.word(0) == Some(key.to_str())
    }
    /// Re-joined line text, for error reporting
    pub fn text(&self) -> String {
        self.words.join(" ")
    }
}

///
/// # Rule Lexer
///
/// Breaks source into a peekable iteration of [Line]s.
/// Blank lines are skipped, as are lines starting with `#` unless created [RuleLexer::with_comments].
///
pub struct RuleLexer<'src> {
    lines: std::iter::Enumerate<std::str::Lines<'src>>,
    next_line: Option<Line<'src>>,
    skip_comments: bool,
}
impl<'src> RuleLexer<'src> {
    pub fn new(src: &'src str) -> Self {
        Self::create(src, true)
    }
    /// Create a [RuleLexer] which yields `#` comment lines
    pub fn with_comments(src: &'src str) -> Self {
        Self::create(src, false)
    }
    fn create(src: &'src str, skip_comments: bool) -> Self {
        let mut lex = Self {
            lines: src.lines().enumerate(),
            next_line: None,
            skip_comments,
        };
        lex.next_line = lex.lex_line();
        lex
    }
    fn lex_line(&mut self) -> Option<Line<'src>> {
        loop {
            let (idx, txt) = self.lines.next()?;
            let words: Vec<&str> = txt.split_whitespace().collect();
            match words.first() {
                None => continue,
                Some(w) if self.skip_comments && w.starts_with('#') => continue,
                Some(_) => return Some(Line { num: idx + 1, words }),
            }
        }
    }
    /// Peek at the next [Line] without consuming it
    pub fn peek_line(&self) -> Option<&Line<'src>> {
        self.next_line.as_ref()
    }
    /// Consume and return the next [Line]
    pub fn next_line(&mut self) -> Option<Line<'src>> {
        let nxt = self.lex_line();
        std::mem::replace(&mut self.next_line, nxt)
    }
}
impl<'src> Iterator for RuleLexer<'src> {
    type Item = Line<'src>;
    fn next(&mut self) -> Option<Self::Item> {
        self.next_line()
    }
}

/// Boolean indication of whether `line` opens a relationship section, e.g. `Metal 2 OVER`
fn is_section_header(line: &Line) -> bool {
    line.words.len() == 3
        && line.starts_with(RuleKey::Metal)
        && RelationKind::from_str(line.words[2]).is_some()
}
/// Boolean indication of whether `line` closes a density model
fn is_model_end(line: &Line) -> bool {
    line.starts_with(RuleKey::End) && line.word(1) == Some(RuleKey::DensityModel.to_str())
}

///
/// # Rule-File Parser
///
/// Parses an [RcModel] from a [RuleLexer]'s lines.
/// Malformed relationship sections are logged and skipped,
/// leaving their tables unbuilt.
///
pub struct RuleParser<'src> {
    lex: RuleLexer<'src>,
    /// Most recently consumed line
    line: Option<Line<'src>>,
    /// Context stack
    ctx: Vec<RuleParseContext>,
    options: RuleOptions,
    /// Decimal conversion of `options.db_factor`
    db_factor: Decimal,
    layer_count: usize,
}
impl<'src> RuleParser<'src> {
    pub fn new(src: &'src str, options: RuleOptions) -> Self {
        let db_factor = Decimal::from_f64(options.db_factor).unwrap_or(Decimal::ONE);
        Self {
            lex: RuleLexer::new(src),
            line: None,
            ctx: Vec::new(),
            options,
            db_factor,
            layer_count: 0,
        }
    }
    /// Parse a complete [RcModel]
    pub fn parse_model(&mut self) -> RcxResult<RcModel> {
        let rates = self.parse_header()?;
        let selected: Vec<usize> = match &self.options.corners {
            Some(c) => c.clone(),
            None => (0..rates.len()).collect(),
        };
        for &k in selected.iter() {
            if k >= rates.len() {
                return RcxError::fail(format!(
                    "DensityModel {} requested, {} available",
                    k,
                    rates.len()
                ));
            }
        }
        let corner_rates = selected.iter().map(|&k| rates[k]).collect();
        let mut model = RcModel::new(self.layer_count, corner_rates, self.options.clone());

        let mut found = vec![false; selected.len()];
        while self.lex.peek_line().is_some() {
            let line = self.next_line()?;
            self.expect_key(&line, 0, RuleKey::DensityModel)?;
            let k = self.parse_usize(&line, 1)?;
            let slot = selected.iter().position(|&s| s == k);
            if slot.is_none() {
                debug!("Skipping DensityModel {}", k);
            }
            self.parse_density_model(k, slot.and_then(|i| model.corner_mut(i)))?;
            if let Some(i) = slot {
                found[i] = true;
            }
        }
        for (i, f) in found.iter().enumerate() {
            if !f {
                return RcxError::fail(format!("DensityModel {} not found", selected[i]));
            }
        }
        model.densify_all();
        model.log_missing();
        info!(
            "Loaded {} of {} corners, {} layers",
            model.corner_count(),
            rates.len(),
            self.layer_count.saturating_sub(1)
        );
        Ok(model)
    }
    /// Parse the header through the first `DensityModel`. Returns the density rates.
    fn parse_header(&mut self) -> RcxResult<Vec<f64>> {
        self.ctx.push(RuleParseContext::Header);
        let mut layer_count: Option<usize> = None;
        let mut rates: Option<Vec<f64>> = None;
        loop {
            let key = match self.lex.peek_line() {
                None => break,
                Some(l) if l.starts_with(RuleKey::DensityModel) => break,
                Some(l) => l.word(0).and_then(RuleKey::from_str),
            };
            let line = self.next_line()?;
            match key {
                Some(RuleKey::Extraction) => (), // Title
                Some(RuleKey::DiagModel) => {
                    self.options.diag_model = match self.parse_key(&line, 1)? {
                        RuleKey::On => DiagModel::Simple,
                        RuleKey::True => DiagModel::Full,
                        RuleKey::Off => DiagModel::None,
                        _ => return self.fail_tp(RuleParseErrorType::InvalidValue),
                    };
                }
                Some(RuleKey::ReverseOrder) => {
                    if self.parse_key(&line, 1)? == RuleKey::On {
                        self.options.reverse_over_under = true;
                    }
                }
                Some(RuleKey::LayerCount) => {
                    layer_count = Some(self.parse_usize(&line, 1)? + 1);
                }
                Some(RuleKey::DensityRate) => {
                    let n = self.parse_usize(&line, 1)?;
                    let r = (0..n)
                        .map(|i| self.parse_f64(&line, 2 + i))
                        .collect::<RcxResult<Vec<_>>>()?;
                    rates = Some(r);
                }
                _ => return self.fail_tp(RuleParseErrorType::InvalidKey),
            }
        }
        self.layer_count = self.unwrap(layer_count, "Missing LayerCount")?;
        let rates = self.unwrap(rates, "Missing DensityRate")?;
        self.ctx.pop();
        Ok(rates)
    }
    /// Parse the body of `DensityModel k`, installing its tables into `corner` if provided
    fn parse_density_model(&mut self, k: usize, mut corner: Option<&mut CornerModel>) -> RcxResult<()> {
        self.ctx.push(RuleParseContext::DensityModel);
        loop {
            let line = self.next_line()?;
            if is_model_end(&line) {
                let n = self.parse_usize(&line, 2)?;
                if n != k {
                    return self.fail_msg(
                        RuleParseErrorType::InvalidValue,
                        format!("END of DensityModel {} inside DensityModel {}", n, k),
                    );
                }
                break;
            }
            if !is_section_header(&line) {
                return self.fail_tp(RuleParseErrorType::InvalidKey);
            }
            let depth = self.ctx.len();
            match self.parse_section(&line) {
                Ok(table) => {
                    if let Some(c) = corner.as_mut() {
                        if let Err(e) = c.install(table) {
                            warn!("DensityModel {}: {}", k, e);
                        }
                    }
                }
                Err(e) if e.is_parse() => {
                    warn!("DensityModel {}: skipping malformed section: {}", k, e);
                    self.ctx.truncate(depth);
                    self.recover();
                }
                Err(e) => return Err(e),
            }
        }
        self.ctx.pop();
        Ok(())
    }
    /// Skip ahead to the next section header or density-model end
    fn recover(&mut self) {
        while let Some(l) = self.lex.peek_line() {
            if is_section_header(l) || is_model_end(l) {
                break;
            }
            self.lex.next_line();
        }
    }
    /// Parse a relationship section opened by `header`
    fn parse_section(&mut self, header: &Line<'src>) -> RcxResult<WidthIndexedTable> {
        self.ctx.push(RuleParseContext::Section);
        let met = self.parse_usize(header, 1)?;
        let kind = self.parse_enum::<RelationKind>(header, 2)?;
        let lc = self.layer_count;
        if !is_applicable(kind, met, lc, self.options.diag_model) {
            return self.fail_msg(
                RuleParseErrorType::InvalidValue,
                format!("{} not applicable to layer {} of {}", kind, met, lc),
            );
        }
        let widths = self.parse_length_list(RuleKey::Width)?;
        let count = relation_count(kind, met, lc);
        let mut table = WidthIndexedTable::new(kind, met, count, &widths, self.options.modulo);

        match kind {
            RelationKind::Over | RelationKind::ResOver => {
                for under in 0..met {
                    self.parse_sub_header(met, kind, under)?;
                    self.parse_width_tables(&mut table, under, &widths)?;
                }
            }
            RelationKind::DiagUnder if self.options.diag_model == DiagModel::Full => {
                self.parse_diag_tables(&mut table, &widths)?;
            }
            RelationKind::Under | RelationKind::DiagUnder => {
                for over in met + 1..lc {
                    self.parse_sub_header(met, kind, over)?;
                    self.parse_width_tables(&mut table, over - met - 1, &widths)?;
                }
            }
            RelationKind::OverUnder => {
                for under in 1..met {
                    for over in met + 1..lc {
                        let rel = self.parse_over_under_header(met, under, over)?;
                        self.parse_width_tables(&mut table, rel, &widths)?;
                    }
                }
            }
        }
        self.ctx.pop();
        Ok(table)
    }
    /// Parse a sub-block header `Metal <met> <kind> <neighbor>`
    fn parse_sub_header(&mut self, met: usize, kind: RelationKind, neighbor: usize) -> RcxResult<()> {
        self.ctx.push(RuleParseContext::SubBlock);
        let line = self.next_line()?;
        self.expect_key(&line, 0, RuleKey::Metal)?;
        self.expect_usize(&line, 1, met)?;
        self.expect_word(&line, 2, kind.to_str())?;
        self.expect_usize(&line, 3, neighbor)?;
        self.ctx.pop();
        Ok(())
    }
    /// Parse an OverUnder sub-block header `Metal <met> OVER <under> UNDER <over>`.
    /// Returns its relation index.
    fn parse_over_under_header(&mut self, met: usize, under: usize, over: usize) -> RcxResult<usize> {
        self.ctx.push(RuleParseContext::SubBlock);
        let line = self.next_line()?;
        self.expect_key(&line, 0, RuleKey::Metal)?;
        self.expect_usize(&line, 1, met)?;
        self.expect_key(&line, 2, RuleKey::Over)?;
        let under_hdr = self.parse_usize(&line, 3)?;
        self.expect_key(&line, 4, RuleKey::Under)?;
        // In reverse order, the header rather than the position names the layer above
        let over = match self.options.reverse_over_under {
            true => self.parse_usize(&line, 5)?,
            false => over,
        };
        if under_hdr != under {
            debug!("OverUnder header names layer {} below, position {}", under_hdr, under);
        }
        let rel = index_over_under(met, under_hdr, over, self.layer_count)
            .map_err(|e| self.error(RuleParseErrorType::InvalidValue, Some(e.to_string())))?;
        self.ctx.pop();
        Ok(rel)
    }
    /// Parse one `DIST` table per width into relation `rel` of `table`
    fn parse_width_tables(&mut self, table: &mut WidthIndexedTable, rel: usize, widths: &[Int]) -> RcxResult<()> {
        for (wi, &w) in widths.iter().enumerate() {
            let samples = self.parse_dist_table(w, None)?;
            let dest = table
                .table_mut(rel, wi)
                .unwrapper(self, format!("No table for relation {} width {}", rel, w))?;
            for s in samples {
                dest.add_measured(s);
            }
        }
        Ok(())
    }
    /// Parse the full diagonal-model blocks of a DiagUnder section
    fn parse_diag_tables(&mut self, table: &mut WidthIndexedTable, widths: &[Int]) -> RcxResult<()> {
        let met = table.met;
        // Optional table-count lines
        for key in [RuleKey::DiagWidth, RuleKey::DiagDist] {
            let is_count = match self.lex.peek_line() {
                Some(l) => l.starts_with(key) && l.word(2) == Some(RuleKey::TableCount.to_str()),
                None => false,
            };
            if is_count {
                self.next_line()?;
            }
        }
        let top = (met + 1 + DIAG_LAYER_SPAN).min(self.layer_count);
        for over in met + 1..top {
            self.parse_sub_header(met, RelationKind::DiagUnder, over)?;
            let rel = over - met - 1;
            let dws = self.parse_length_list(RuleKey::DiagWidth)?;
            let dds = self.parse_length_list(RuleKey::DiagDist)?;
            if dws.is_empty() || dds.is_empty() {
                // Relation without diagonal data. Any tables it lists are empty.
                continue;
            }
            table
                .set_diag_axes(rel, &dws, &dds, self.options.modulo)
                .map_err(|e| self.error(RuleParseErrorType::InvalidValue, Some(e.to_string())))?;
            for (wi, &w) in widths.iter().enumerate() {
                for (dwi, &dw) in dws.iter().enumerate() {
                    for (dsi, &dd) in dds.iter().enumerate() {
                        let samples = self.parse_dist_table(w, Some((dw, dd)))?;
                        let dest = table
                            .diag_table_mut(rel, wi, dwi, dsi)
                            .unwrapper(self, "No diagonal table")?;
                        for s in samples {
                            dest.add_measured(s);
                        }
                    }
                }
            }
        }
        Ok(())
    }
    /// Parse a list line `<key> Table <n> entries: <v1> ... <vn>`, in microns
    fn parse_length_list(&mut self, key: RuleKey) -> RcxResult<Vec<Int>> {
        let line = self.next_line()?;
        self.expect_key(&line, 0, key)?;
        self.expect_key(&line, 1, RuleKey::Table)?;
        let n = self.parse_usize(&line, 2)?;
        self.expect_key(&line, 3, RuleKey::Entries)?;
        let vals = (0..n)
            .map(|i| self.parse_length(&line, 4 + i))
            .collect::<RcxResult<Vec<_>>>()?;
        if vals.windows(2).any(|p| p[1] <= p[0]) {
            return self.fail_msg(RuleParseErrorType::InvalidValue, format!("{} entries must ascend", key));
        }
        Ok(vals)
    }
    /// Parse a `DIST` table for `width`, and for the diagonal neighbor `diag` if provided
    fn parse_dist_table(&mut self, width: Int, diag: Option<(Int, Int)>) -> RcxResult<Vec<DistanceSample>> {
        self.ctx.push(RuleParseContext::DistTable);
        let line = self.next_line()?;
        self.expect_key(&line, 0, RuleKey::Dist)?;
        self.expect_key(&line, 1, RuleKey::Count)?;
        let n = self.parse_usize(&line, 2)?;
        self.expect_key(&line, 3, RuleKey::WidthParam)?;
        self.expect_length(&line, 4, width)?;
        if let Some((dw, dd)) = diag {
            self.expect_key(&line, 5, RuleKey::DiagWidthParam)?;
            self.expect_length(&line, 6, dw)?;
            self.expect_key(&line, 7, RuleKey::DiagDistParam)?;
            self.expect_length(&line, 8, dd)?;
        }
        let mut samples: Vec<DistanceSample> = Vec::with_capacity(n);
        for _ in 0..n {
            let row = self.next_line()?;
            let sample = DistanceSample {
                separation: self.parse_length(&row, 0)?,
                coupling: self.parse_value(&row, 1)?,
                fringe: self.parse_value(&row, 2)?,
                resistance: self.parse_value(&row, 3)?,
                diagonal: match row.words.len() {
                    0..=4 => 0.0,
                    _ => self.parse_value(&row, 4)?,
                },
            };
            if let Some(prev) = samples.last() {
                if sample.separation < prev.separation {
                    return self.fail_msg(RuleParseErrorType::InvalidValue, "Separations must not decrease");
                }
            }
            samples.push(sample);
        }
        let end = self.next_line()?;
        self.expect_key(&end, 0, RuleKey::End)?;
        self.expect_key(&end, 1, RuleKey::Dist)?;
        self.ctx.pop();
        Ok(samples)
    }

    /// Consume the next line, failing at end of input
    fn next_line(&mut self) -> RcxResult<Line<'src>> {
        match self.lex.next_line() {
            Some(line) => {
                self.line = Some(line.clone());
                Ok(line)
            }
            None => self.fail_tp(RuleParseErrorType::UnexpectedEof),
        }
    }
    fn word(&self, line: &Line<'src>, idx: usize) -> RcxResult<&'src str> {
        match line.word(idx) {
            Some(w) => Ok(w),
            None => self.fail_msg(RuleParseErrorType::InvalidValue, format!("Missing word {}", idx + 1)),
        }
    }
    fn expect_word(&self, line: &Line<'src>, idx: usize, expected: &str) -> RcxResult<()> {
        match line.word(idx) {
            Some(w) if w == expected => Ok(()),
            _ => self.fail_tp(RuleParseErrorType::RequiredWord {
                expected: expected.to_string(),
            }),
        }
    }
    fn expect_key(&self, line: &Line<'src>, idx: usize, key: RuleKey) -> RcxResult<()> {
        self.expect_word(line, idx, key.to_str())
    }
    fn expect_usize(&self, line: &Line<'src>, idx: usize, expected: usize) -> RcxResult<()> {
        let val = self.parse_usize(line, idx)?;
        if val != expected {
            return self.fail_msg(
                RuleParseErrorType::InvalidValue,
                format!("Expected {}, found {}", expected, val),
            );
        }
        Ok(())
    }
    fn expect_length(&self, line: &Line<'src>, idx: usize, expected: Int) -> RcxResult<()> {
        let val = self.parse_length(line, idx)?;
        if val != expected {
            return self.fail_msg(
                RuleParseErrorType::InvalidValue,
                format!("Expected length {}nm, found {}nm", expected, val),
            );
        }
        Ok(())
    }
    fn parse_key(&self, line: &Line<'src>, idx: usize) -> RcxResult<RuleKey> {
        self.parse_enum::<RuleKey>(line, idx)
    }
    fn parse_enum<T: EnumStr>(&self, line: &Line<'src>, idx: usize) -> RcxResult<T> {
        let txt = self.word(line, idx)?;
        match T::from_str(txt) {
            Some(t) => Ok(t),
            None => self.fail_tp(RuleParseErrorType::InvalidKey),
        }
    }
    fn parse_usize(&self, line: &Line<'src>, idx: usize) -> RcxResult<usize> {
        let txt = self.word(line, idx)?;
        match txt.parse::<usize>() {
            Ok(v) => Ok(v),
            Err(_) => self.fail_msg(RuleParseErrorType::InvalidValue, format!("Invalid integer `{}`", txt)),
        }
    }
    fn parse_f64(&self, line: &Line<'src>, idx: usize) -> RcxResult<f64> {
        let txt = self.word(line, idx)?;
        match txt.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => self.fail_msg(RuleParseErrorType::InvalidValue, format!("Invalid number `{}`", txt)),
        }
    }
    /// Parse a capacitance or resistance value, scaled by the database-unit factor
    fn parse_value(&self, line: &Line<'src>, idx: usize) -> RcxResult<f64> {
        Ok(self.parse_f64(line, idx)? / self.options.db_factor)
    }
    /// Parse a length in microns, returning nanometers.
    /// Conversion is exact decimal, rounding half away from zero.
    fn parse_length(&self, line: &Line<'src>, idx: usize) -> RcxResult<Int> {
        let txt = self.word(line, idx)?;
        let invalid = || self.error(RuleParseErrorType::InvalidValue, Some(format!("Invalid length `{}`", txt)));
        let um = Decimal::from_str(txt)
            .or_else(|_| Decimal::from_scientific(txt))
            .map_err(|_| invalid())?;
        let nm = um
            .checked_mul(Decimal::from(1000))
            .and_then(|v| v.checked_mul(self.db_factor))
            .ok_or_else(invalid)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        let nm = nm.to_i64().ok_or_else(invalid)?;
        Ok(nm as Int)
    }

    /// Create a [RcxError::Parse] at the current line and context
    fn error(&self, tp: RuleParseErrorType, msg: Option<String>) -> RcxError {
        let (line, text) = match &self.line {
            Some(l) => (l.num, l.text()),
            None => (0, String::new()),
        };
        RcxError::Parse {
            msg,
            tp,
            line,
            text,
            ctx: self.ctx.clone(),
        }
    }
    fn fail_tp<T>(&self, tp: RuleParseErrorType) -> RcxResult<T> {
        Err(self.error(tp, None))
    }
    fn fail_msg<T>(&self, tp: RuleParseErrorType, msg: impl Into<String>) -> RcxResult<T> {
        Err(self.error(tp, Some(msg.into())))
    }
}
impl ErrorHelper for RuleParser<'_> {
    type Error = RcxError;
    fn err(&self, msg: impl Into<String>) -> RcxError {
        self.error(RuleParseErrorType::Other, Some(msg.into()))
    }
}
