use std::fmt::Write as _;

use actor_core::core_api::{ChangeReport, FlagSummary};
use actor_core::store::ChangeCounts;
use serde_json::{Map as JsonMap, Value as JsonValue};

const NAME_COL_WIDTH: usize = 48;
const CATEGORY_COL_WIDTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonStyle {
    #[default]
    CanonicalV1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextStyle {
    #[default]
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextRenderOptions {
    pub verbose: bool,
}

pub fn render_json_report(report: &ChangeReport, style: JsonStyle) -> JsonValue {
    match style {
        JsonStyle::CanonicalV1 => canonical_report(report),
    }
}

pub fn render_json_flags(flags: &[FlagSummary], style: JsonStyle) -> JsonValue {
    match style {
        JsonStyle::CanonicalV1 => JsonValue::Array(flags.iter().map(canonical_flag).collect()),
    }
}

pub fn render_text_report(report: &ChangeReport, style: TextStyle, options: TextRenderOptions) -> String {
    match style {
        TextStyle::Summary => summary_report(report, options),
    }
}

pub fn render_text_flags(flags: &[FlagSummary], style: TextStyle) -> String {
    match style {
        TextStyle::Summary => summary_flags(flags),
    }
}

fn counts_json(counts: ChangeCounts) -> JsonValue {
    let mut out = JsonMap::new();
    out.insert("new".to_string(), JsonValue::from(counts.new));
    out.insert("modified".to_string(), JsonValue::from(counts.modified));
    out.insert("deleted".to_string(), JsonValue::from(counts.deleted));
    JsonValue::Object(out)
}

fn canonical_report(report: &ChangeReport) -> JsonValue {
    let mut categories = JsonMap::new();
    for change in &report.categories {
        categories.insert(change.category.category().to_string(), counts_json(change.counts));
    }

    let mut out = JsonMap::new();
    out.insert("totals".to_string(), counts_json(report.totals()));
    out.insert("categories".to_string(), JsonValue::Object(categories));
    out.insert("save_data".to_string(), counts_json(report.save_data));
    out.insert(
        "actors".to_string(),
        JsonValue::Array(
            report
                .actors
                .iter()
                .map(|a| JsonValue::String(a.clone()))
                .collect(),
        ),
    );
    out.insert(
        "gamedata_pages".to_string(),
        JsonValue::from(report.gamedata_pages),
    );
    out.insert(
        "savedata_pages".to_string(),
        JsonValue::from(report.savedata_pages),
    );
    JsonValue::Object(out)
}

fn canonical_flag(flag: &FlagSummary) -> JsonValue {
    let mut out = JsonMap::new();
    out.insert("name".to_string(), JsonValue::String(flag.name.clone()));
    out.insert("hash".to_string(), JsonValue::from(flag.hash));
    out.insert(
        "category".to_string(),
        JsonValue::String(flag.category.category().to_string()),
    );
    out.insert("persistent".to_string(), JsonValue::Bool(flag.persistent));
    out.insert("revival".to_string(), JsonValue::Bool(flag.revival));
    JsonValue::Object(out)
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "flag was" } else { "flags were" }
}

fn write_counts(out: &mut String, counts: ChangeCounts, target: &str) {
    if counts.new > 0 {
        writeln!(out, "{} {} added to {target}", counts.new, plural(counts.new))
            .expect("writing to String cannot fail");
    }
    if counts.modified > 0 {
        writeln!(
            out,
            "{} {} modified in {target}",
            counts.modified,
            plural(counts.modified)
        )
        .expect("writing to String cannot fail");
    }
    if counts.deleted > 0 {
        writeln!(
            out,
            "{} {} removed from {target}",
            counts.deleted,
            plural(counts.deleted)
        )
        .expect("writing to String cannot fail");
    }
}

fn summary_report(report: &ChangeReport, options: TextRenderOptions) -> String {
    let mut out = String::new();
    if report.is_empty() {
        writeln!(&mut out, "No changes").expect("writing to String cannot fail");
        return out;
    }

    for actor in &report.actors {
        writeln!(&mut out, "Actor: {actor}").expect("writing to String cannot fail");
    }

    if options.verbose {
        for change in &report.categories {
            write_counts(&mut out, change.counts, change.category.category());
        }
    } else {
        write_counts(&mut out, report.totals(), "game data");
    }
    write_counts(&mut out, report.save_data, "save data");

    writeln!(
        &mut out,
        "Wrote {} game data pages and {} save data pages",
        report.gamedata_pages, report.savedata_pages
    )
    .expect("writing to String cannot fail");
    out
}

fn summary_flags(flags: &[FlagSummary]) -> String {
    let mut out = String::new();
    if flags.is_empty() {
        writeln!(&mut out, "No matching flags").expect("writing to String cannot fail");
        return out;
    }
    for flag in flags {
        let mut marks = String::new();
        if flag.persistent {
            marks.push_str(" save");
        }
        if flag.revival {
            marks.push_str(" revival");
        }
        let line = format!(
            "{:<name$} {:<cat$} {:>11}{}",
            fit_column(&flag.name, NAME_COL_WIDTH),
            flag.category.category(),
            flag.hash,
            marks,
            name = NAME_COL_WIDTH,
            cat = CATEGORY_COL_WIDTH,
        );
        writeln!(&mut out, "{}", line.trim_end()).expect("writing to String cannot fail");
    }
    writeln!(&mut out, "{} flags", flags.len()).expect("writing to String cannot fail");
    out
}

fn fit_column(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    if width <= 3 {
        return value.chars().take(width).collect();
    }

    let mut out = String::with_capacity(width);
    for ch in value.chars().take(width - 3) {
        out.push(ch);
    }
    out.push_str("...");
    out
}
