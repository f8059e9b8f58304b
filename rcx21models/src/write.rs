//!
//! # Rule-File Writing Module
//!

// Std-Lib
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::Path;

// Crates.io
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

// Local imports
use crate::corner::{CornerModel, DiagModel, RcModel};
use crate::distance::{DistanceTable, Int};
use crate::error::{RcxError, RcxResult};
use crate::read::RuleKey;
use crate::relation::{index_over_under, RelationKind, DIAG_LAYER_SPAN};
use crate::width::WidthIndexedTable;

/// Write [RcModel] `model` to rule file `fname`
pub fn save(model: &RcModel, fname: impl AsRef<Path>) -> RcxResult<()> {
    let file = BufWriter::new(std::fs::File::create(fname)?);
    let mut wr = RuleWriter::new(file, model);
    wr.write_model()
}
/// Write [RcModel] `model` to a rule-file format [String]
pub fn to_string(model: &RcModel) -> RcxResult<String> {
    let mut buf: Vec<u8> = Vec::new();
    {
        let mut wr = RuleWriter::new(&mut buf, model);
        wr.write_model()?;
    }
    Ok(std::str::from_utf8(&buf)?.to_string())
}

/// # Rule-File Writer
pub struct RuleWriter<'wr> {
    dest: Box<dyn Write + 'wr>,
    model: &'wr RcModel,
}
impl<'wr> RuleWriter<'wr> {
    pub fn new(dest: impl Write + 'wr, model: &'wr RcModel) -> Self {
        Self {
            dest: Box::new(dest),
            model,
        }
    }
    /// Write the complete model
    pub fn write_model(&mut self) -> RcxResult<()> {
        let model = self.model;
        let opts = model.options();
        self.write_line(format_args!("Extraction Rules for rcx21"))?;
        self.write_line(format_args!(""))?;
        match opts.diag_model {
            DiagModel::None => (),
            DiagModel::Simple => self.write_line(format_args!("{} {}", RuleKey::DiagModel, RuleKey::On))?,
            DiagModel::Full => self.write_line(format_args!("{} {}", RuleKey::DiagModel, RuleKey::True))?,
        }
        if opts.reverse_over_under {
            self.write_line(format_args!("{} {}", RuleKey::ReverseOrder, RuleKey::On))?;
        }
        self.write_line(format_args!(
            "{} {}",
            RuleKey::LayerCount,
            model.layer_count().saturating_sub(1)
        ))?;
        let rates: Vec<String> = model.rates().iter().map(|r| r.to_string()).collect();
        self.write_line(format_args!(
            "{} {} {}",
            RuleKey::DensityRate,
            rates.len(),
            rates.join(" ")
        ))?;
        for (idx, corner) in model.corners().iter().enumerate() {
            self.write_line(format_args!(""))?;
            self.write_line(format_args!("{} {}", RuleKey::DensityModel, idx))?;
            self.write_corner(corner)?;
            self.write_line(format_args!("{} {} {}", RuleKey::End, RuleKey::DensityModel, idx))?;
        }
        self.dest.flush()?;
        Ok(())
    }
    fn write_corner(&mut self, corner: &CornerModel) -> RcxResult<()> {
        for met in 1..corner.layer_count() {
            let layer = match corner.layer(met) {
                Some(l) => l,
                None => continue,
            };
            for table in layer.tables() {
                self.write_table(table)?;
            }
        }
        Ok(())
    }
    /// Write a relationship section
    fn write_table(&mut self, table: &WidthIndexedTable) -> RcxResult<()> {
        let (met, kind) = (table.met, table.kind);
        let lc = self.model.layer_count();
        let full_diag = kind == RelationKind::DiagUnder && self.model.options().diag_model == DiagModel::Full;

        self.write_line(format_args!(""))?;
        self.write_line(format_args!("{} {} {}", RuleKey::Metal, met, kind))?;
        self.write_length_list(RuleKey::Width, table.widths())?;
        match kind {
            RelationKind::Over | RelationKind::ResOver => {
                for under in 0..met {
                    self.write_line(format_args!("{} {} {} {}", RuleKey::Metal, met, kind, under))?;
                    self.write_width_tables(table, under)?;
                }
            }
            RelationKind::DiagUnder if full_diag => {
                let top = (met + 1 + DIAG_LAYER_SPAN).min(lc);
                let (ndw, nds) = (0..top.saturating_sub(met + 1))
                    .filter_map(|rel| table.diag_plane(rel))
                    .fold((0, 0), |(a, b), p| (a.max(p.diag_widths().len()), b.max(p.diag_dists().len())));
                self.write_line(format_args!("{} {} {} {}", RuleKey::DiagWidth, RuleKey::Table, RuleKey::TableCount, ndw))?;
                self.write_line(format_args!("{} {} {} {}", RuleKey::DiagDist, RuleKey::Table, RuleKey::TableCount, nds))?;
                for over in met + 1..top {
                    let rel = over - met - 1;
                    self.write_line(format_args!("{} {} {} {}", RuleKey::Metal, met, kind, over))?;
                    self.write_diag_tables(table, rel)?;
                }
            }
            RelationKind::Under | RelationKind::DiagUnder => {
                for over in met + 1..lc {
                    self.write_line(format_args!("{} {} {} {}", RuleKey::Metal, met, kind, over))?;
                    self.write_width_tables(table, over - met - 1)?;
                }
            }
            RelationKind::OverUnder => {
                for under in 1..met {
                    for over in met + 1..lc {
                        self.write_line(format_args!(
                            "{} {} {} {} {} {}",
                            RuleKey::Metal,
                            met,
                            RuleKey::Over,
                            under,
                            RuleKey::Under,
                            over
                        ))?;
                        let rel = index_over_under(met, under, over, lc)?;
                        self.write_width_tables(table, rel)?;
                    }
                }
            }
        }
        Ok(())
    }
    /// Write one `DIST` table per width, for relation `rel`
    fn write_width_tables(&mut self, table: &WidthIndexedTable, rel: usize) -> RcxResult<()> {
        let empty = DistanceTable::new();
        for (wi, &w) in table.widths().iter().enumerate() {
            let dt = table.table(rel, wi).unwrap_or(&empty);
            self.write_dist_table(dt, w, None)?;
        }
        Ok(())
    }
    /// Write the diagonal axes and tables of relation `rel`
    fn write_diag_tables(&mut self, table: &WidthIndexedTable, rel: usize) -> RcxResult<()> {
        let (dws, dds) = match table.diag_plane(rel) {
            Some(p) => (p.diag_widths().to_vec(), p.diag_dists().to_vec()),
            None => (Vec::new(), Vec::new()),
        };
        self.write_length_list(RuleKey::DiagWidth, &dws)?;
        self.write_length_list(RuleKey::DiagDist, &dds)?;
        let empty = DistanceTable::new();
        for (wi, &w) in table.widths().iter().enumerate() {
            for (dwi, &dw) in dws.iter().enumerate() {
                for (dsi, &dd) in dds.iter().enumerate() {
                    let dt = table.diag_table(rel, wi, dwi, dsi).unwrap_or(&empty);
                    self.write_dist_table(dt, w, Some((dw, dd)))?;
                }
            }
        }
        Ok(())
    }
    /// Write a list line `<key> Table <n> entries: <v1> ... <vn>`
    fn write_length_list(&mut self, key: RuleKey, vals: &[Int]) -> RcxResult<()> {
        let mut txt = format!("{} {} {} {}", key, RuleKey::Table, vals.len(), RuleKey::Entries);
        for &v in vals {
            txt.push(' ');
            txt.push_str(&self.fmt_length(v)?);
        }
        self.write_line(format_args!("{}", txt))
    }
    fn write_dist_table(&mut self, dt: &DistanceTable, width: Int, diag: Option<(Int, Int)>) -> RcxResult<()> {
        let mut hdr = format!(
            "{} {} {} {} {}",
            RuleKey::Dist,
            RuleKey::Count,
            dt.len(),
            RuleKey::WidthParam,
            self.fmt_length(width)?
        );
        if let Some((dw, dd)) = diag {
            hdr = format!(
                "{} {} {} {} {}",
                hdr,
                RuleKey::DiagWidthParam,
                self.fmt_length(dw)?,
                RuleKey::DiagDistParam,
                self.fmt_length(dd)?
            );
        }
        self.write_line(format_args!("{}", hdr))?;
        let db = self.model.options().db_factor;
        for s in dt.measured() {
            let sep = self.fmt_length(s.separation)?;
            if s.diagonal != 0.0 {
                self.write_line(format_args!(
                    "{} {} {} {} {}",
                    sep,
                    s.coupling * db,
                    s.fringe * db,
                    s.resistance * db,
                    s.diagonal * db
                ))?;
            } else {
                self.write_line(format_args!(
                    "{} {} {} {}",
                    sep,
                    s.coupling * db,
                    s.fringe * db,
                    s.resistance * db
                ))?;
            }
        }
        self.write_line(format_args!("{} {}", RuleKey::End, RuleKey::Dist))
    }
    /// Format nanometer length `nm` in microns, undoing the database-unit factor
    fn fmt_length(&self, nm: Int) -> RcxResult<String> {
        let um = Decimal::new(nm as i64, 3);
        let db = self.model.options().db_factor;
        let um = if db == 1.0 {
            um
        } else {
            let db = Decimal::from_f64(db).ok_or_else(|| RcxError::msg("Invalid db_factor"))?;
            um.checked_div(db).ok_or_else(|| RcxError::msg("Invalid db_factor"))?
        };
        Ok(um.normalize().to_string())
    }
    /// Helper function to write a line
    fn write_line(&mut self, args: fmt::Arguments) -> RcxResult<()> {
        writeln!(self.dest, "{}", args)?;
        Ok(())
    }
}
