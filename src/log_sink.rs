//! Append-only CSV move log (spec §6 "Output log").
//!
//! One row per move: match_id, game_name, step, role, player_name,
//! population_size, rollout_depth, update_ms, select_ms, chosen_move,
//! was_illegal_last_turn, simulations_run, forward_calls.
//!
//! No CSV crate is pulled in here — nothing in the reference corpus reaches
//! for one to emit a flat, fixed-schema row; this hand-formats the line the
//! way the teacher hand-formats its own tabular stdout summaries
//! (`mccfr::structs::stats::TrainingStats::format`).

use std::fmt::Write as _;
use std::io::Write as _;

use crate::metrics::TurnMetrics;

pub const HEADER: &str = "match_id,game_name,step,role,player_name,population_size,rollout_depth,update_ms,select_ms,chosen_move,was_illegal_last_turn,simulations_run,forward_calls";

pub struct MoveLogRow<'a> {
    pub match_id: &'a str,
    pub game_name: &'a str,
    pub step: usize,
    pub role: &'a str,
    pub player_name: &'a str,
    pub chosen_move: &'a str,
    pub was_illegal_last_turn: bool,
}

impl MoveLogRow<'_> {
    pub fn to_csv_line(&self, metrics: &TurnMetrics) -> String {
        let mut line = String::new();
        let _ = write!(
            line,
            "{},{},{},{},{},{},{},{},{},{},{},{},{}",
            csv_field(self.match_id),
            csv_field(self.game_name),
            self.step,
            csv_field(self.role),
            csv_field(self.player_name),
            metrics.population_size,
            metrics.rollout_depth,
            metrics.update_ms(),
            metrics.select_ms(),
            csv_field(self.chosen_move),
            self.was_illegal_last_turn,
            metrics.simulations_run,
            metrics.forward_calls,
        );
        line
    }
}

/// quote a field only if it needs it, matching standard CSV escaping.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// an append-only CSV sink, writing the header once on first use.
pub struct LogSink {
    file: std::fs::File,
    wrote_header: bool,
}

impl LogSink {
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let existed = path.exists();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file,
            wrote_header: existed,
        })
    }

    pub fn write_row(&mut self, row: &MoveLogRow, metrics: &TurnMetrics) -> std::io::Result<()> {
        if !self.wrote_header {
            writeln!(self.file, "{HEADER}")?;
            self.wrote_header = true;
        }
        writeln!(self.file, "{}", row.to_csv_line(metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_fields_containing_commas() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn formats_expected_column_count() {
        let row = MoveLogRow {
            match_id: "m1",
            game_name: "rps",
            step: 3,
            role: "p1",
            player_name: "hyperplay",
            chosen_move: "rock",
            was_illegal_last_turn: false,
        };
        let line = row.to_csv_line(&TurnMetrics::default());
        assert_eq!(line.split(',').count(), HEADER.split(',').count());
    }
}
