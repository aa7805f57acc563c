use std::path::Path;

use console::Style;
use orrery_core::process::PipelineSummary;

struct Styles {
    title: Style,
    label: Style,
    ok: Style,
    failed: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            label: Style::new().dim(),
            ok: Style::new().green().bold(),
            failed: Style::new().red().bold(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_run_summary(summary: &PipelineSummary, exported: &[impl AsRef<Path>]) {
    let s = Styles::new();
    let process = &summary.process;

    println!();
    println!("  {}", s.title.apply_to(&process.identifier));
    println!();

    let status = match process.status.as_str() {
        "created" => s.ok.apply_to(process.status.as_str()),
        _ => s.failed.apply_to(process.status.as_str()),
    };
    println!("  {:<14}{}", s.label.apply_to("Status"), status);
    if let Some(ref msg) = process.failure_message {
        println!("  {:<14}{}", s.label.apply_to("Failure"), msg);
    }
    if let Some(ref group) = summary.group_name {
        println!("  {:<14}{}", s.label.apply_to("Group"), group);
    }
    for path in exported {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Output"),
            s.path.apply_to(path.as_ref().display())
        );
    }

    if !summary.logs.is_empty() {
        println!();
        for line in summary.logs.lines() {
            println!("  {}", s.label.apply_to(line));
        }
    }
    println!();
}
