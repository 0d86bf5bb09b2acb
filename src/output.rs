use console::Style;

use crate::mutants::EnrichedMutation;
use crate::partition::Partition;
use crate::state::RunBundle;

pub fn print_error(msg: &str) {
    let style = Style::new().red().bold();
    eprintln!("{} {}", style.apply_to("✗"), msg);
}

pub fn print_success(msg: &str) {
    let style = Style::new().green().bold();
    println!("{} {}", style.apply_to("✓"), msg);
}

pub fn print_plan(partitions: &[Partition]) {
    let id_style = Style::new().cyan().bold();
    let dim = Style::new().dim();
    println!("{} partitions", partitions.len());
    for p in partitions {
        println!(
            "  {} {} classes, {} tests",
            id_style.apply_to(&p.id),
            p.target_classes.len(),
            p.target_tests.len(),
        );
        for class in &p.target_classes {
            println!("    {}", dim.apply_to(class));
        }
    }
}

pub fn print_run_result(bundle: &RunBundle) {
    let result = &bundle.result;
    let failed = bundle.failed_partitions();

    if result.survived() == 0 && failed == 0 {
        let style = Style::new().green().bold();
        println!(
            "{} {}: {} mutants, all killed ({:.1}%) across {} partitions",
            style.apply_to("✓"),
            bundle.coordinates.artifact_id,
            result.total,
            result.score,
            bundle.partition_count,
        );
        return;
    }

    let style = Style::new().yellow().bold();
    println!(
        "{} {}: {} survived / {} mutants ({:.1}% killed) across {} partitions",
        style.apply_to("!"),
        bundle.coordinates.artifact_id,
        result.survived(),
        result.total,
        result.score,
        bundle.partition_count,
    );

    if !result.errors.is_empty() {
        let err_style = Style::new().red();
        println!();
        println!("{} partitions failed:", failed);
        for e in &result.errors {
            println!("  {} {}", err_style.apply_to("·"), e);
        }
    }

    let survivors: Vec<&EnrichedMutation> = result.mutations().filter(|m| !m.detected()).collect();
    if survivors.is_empty() {
        return;
    }
    println!();
    for m in survivors {
        print_mutation_line(m);
    }
}

fn print_mutation_line(m: &EnrichedMutation) {
    let class_style = Style::new().cyan().bold();
    let loc_style = Style::new().dim();
    let op_style = Style::new().magenta();

    let shown = if m.original_code_snippet.is_empty() {
        m.raw.description.clone()
    } else {
        format!("{} → {}", m.original_code_snippet, m.synthesized_mutated_snippet)
    };
    println!(
        "  {}:{} {} {}",
        class_style.apply_to(m.raw.simple_class_name()),
        m.raw.line_number,
        loc_style.apply_to(format!("[{}]", short_mutator(&m.raw.mutator_id))),
        op_style.apply_to(shown),
    );
}

fn short_mutator(id: &str) -> &str {
    id.rsplit('.').next().unwrap_or(id)
}

pub fn print_class_detail(class: &str, mutations: &[EnrichedMutation]) {
    let class_style = Style::new().cyan().bold();
    let dim = Style::new().dim();
    let killed = mutations.iter().filter(|m| m.detected()).count();

    println!(
        "{} {} killed / {} mutants",
        class_style.apply_to(class),
        killed,
        mutations.len()
    );
    for m in mutations {
        println!();
        let verdict = if m.detected() {
            Style::new().green().apply_to("killed")
        } else {
            Style::new().yellow().apply_to("survived")
        };
        println!(
            "  {}:{} {} {}",
            m.raw.mutated_method,
            m.raw.line_number,
            verdict,
            dim.apply_to(&m.raw.description),
        );
        if let Some(test) = &m.raw.killing_test {
            println!("    {}", dim.apply_to(format!("by {test}")));
        }
        for line in m.diff.lines() {
            if line.starts_with('-') {
                println!("    {}", Style::new().red().apply_to(line));
            } else if line.starts_with('+') {
                println!("    {}", Style::new().green().apply_to(line));
            }
        }
    }
}

pub fn print_status(bundle: &RunBundle) {
    let result = &bundle.result;
    println!(
        "Last run {}: {} mutants, {} killed, {} survived ({:.1}% score)",
        bundle.run_id,
        result.total,
        result.killed,
        result.survived(),
        result.score,
    );
    println!(
        "{} partitions, {} failed, {}s wall clock",
        bundle.partition_count,
        bundle.failed_partitions(),
        bundle.finished_at.saturating_sub(bundle.started_at),
    );

    let weakest: Vec<(&String, usize)> = result
        .mutations_by_class
        .iter()
        .map(|(class, ms)| (class, ms.iter().filter(|m| !m.detected()).count()))
        .filter(|(_, survived)| *survived > 0)
        .collect();
    if !weakest.is_empty() {
        println!();
        let class_style = Style::new().cyan().bold();
        for (class, survived) in weakest {
            println!("  {} {} survived", class_style.apply_to(class), survived);
        }
        println!();
        println!("Use `mutfleet show <class>` for details on a specific class.");
    }
}
