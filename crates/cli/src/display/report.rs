use comliner_core::{ExecutionDriver, ExecutionReport, Signature, SourcePlan};

/// Print stdout lines in source order, then failures, timings and the
/// summary to stderr
pub fn print_report(report: &ExecutionReport, timings: bool) {
    for record in &report.records {
        if let Some(line) = &record.stdout {
            println!("{}", line);
        }
    }

    for line in report.failure_lines() {
        eprintln!("{}", line);
    }
    if timings {
        eprintln!("{}", report.timings_table());
    }
    eprintln!("{}", report.summary());
    if report.failed_count() > 0 {
        eprintln!("{} iteration(s) failed", report.failed_count());
    }
}

/// Render what `run` would do
pub fn format_plan(signature: &Signature, driver: &ExecutionDriver<'_>, plan: &SourcePlan) -> String {
    let options = driver.options();
    let mut lines = vec![
        format!("function: {}", signature),
        format!("call:     {}", driver.call_plan()),
        format!("outputs:  {}", driver.output_plan()),
    ];
    if let Some(conversions) = format_conversions(driver) {
        lines.push(format!("convert:  {}", conversions));
    }
    lines.extend([
        format!("mode:     {}", plan.mode),
        format!(
            "policies: missing={:?} overwrite={:?} close_gaps={} parallel={}",
            options.omission, options.overwrite, options.close_gaps, options.parallel
        ),
        format!("sources:  {}", plan.len()),
    ]);
    for source in &plan.sources {
        lines.push(format!("  {:>3}  {}", source.index, source.label()));
    }
    lines.join("\n")
}

fn format_conversions(driver: &ExecutionDriver<'_>) -> Option<String> {
    let output_plan = driver.output_plan();
    let before = driver
        .call_plan()
        .params
        .iter()
        .filter_map(|p| p.preproc.as_ref().map(|c| format!("{}<-{}", p.name, c)));
    let after = output_plan
        .postprocs
        .iter()
        .enumerate()
        .filter_map(|(slot, c)| {
            let name = output_plan.slots.get(slot).map(String::as_str).unwrap_or("result");
            c.as_ref().map(|c| format!("{}->{}", name, c))
        });
    let entries: Vec<String> = before.chain(after).collect();
    (!entries.is_empty()).then(|| entries.join(", "))
}

pub fn print_plan(signature: &Signature, driver: &ExecutionDriver<'_>, plan: &SourcePlan) {
    println!("{}", format_plan(signature, driver, plan));
}
