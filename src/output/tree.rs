//! Indented diagnostics printer for detection trees.
//!
//! ```text
//! (Jca) Cipher(NONE) level=0 @ app.py:3:5
//!   Algorithm: AES @ app.py:3:24
//!   KeySize[BIT]: 128 @ app.py:3:31
//!   under -1:
//!     (Jca) Key(RSA) level=1 @ app.py:3:5
//!   then:
//!     (Jca) Cipher(NONE) level=1 @ app.py:4:5
//! ```

use std::fmt::Write;

use super::report::StoreReport;
use crate::engine::DetectionStore;
use crate::language::LanguageSupport;

const INDENT: &str = "  ";

pub fn render_store<L: LanguageSupport>(lang: &L, store: &DetectionStore<L::Node>) -> String {
    render_report(&StoreReport::from_store(lang, store))
}

pub fn render_report(report: &StoreReport) -> String {
    let mut out = String::new();
    write_store(&mut out, report, 0);
    out
}

pub fn render_reports(reports: &[StoreReport]) -> String {
    reports.iter().map(render_report).collect()
}

fn write_store(out: &mut String, report: &StoreReport, depth: usize) {
    let pad = INDENT.repeat(depth);
    let _ = write!(
        out,
        "{pad}({}) {} level={}",
        report.bundle, report.context, report.level
    );
    if let Some(location) = &report.location {
        let _ = write!(out, " @ {location}");
    }
    out.push('\n');

    for value in &report.values {
        let _ = write!(out, "{pad}{INDENT}{}", value.kind);
        if let Some(unit) = &value.unit {
            let _ = write!(out, "[{unit}]");
        }
        let _ = write!(out, ": {}", value.value);
        if let Some(location) = &value.location {
            let _ = write!(out, " @ {location}");
        }
        out.push('\n');
    }

    let mut current_slot = None;
    for child in &report.children {
        if child.parent_slot != current_slot {
            current_slot = child.parent_slot;
            let _ = writeln!(
                out,
                "{pad}{INDENT}under {}:",
                current_slot.map_or_else(|| "?".to_string(), |slot| slot.to_string())
            );
        }
        write_store(out, child, depth + 2);
    }

    if !report.dependents.is_empty() {
        let _ = writeln!(out, "{pad}{INDENT}then:");
        for dependent in &report.dependents {
            write_store(out, dependent, depth + 2);
        }
    }
}
