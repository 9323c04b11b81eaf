//! Interactive menu.
//!
//! A simple line-oriented loop: generate the next chapter, view stats, or exit.

use anyhow::Result;
use saga_core::config::Settings;
use saga_core::models::StoryMemory;
use saga_core::ChapterReport;
use std::io::{self, BufRead, Write};

use crate::{load_seed, open_engine};

const RULE: &str = "============================================================";

pub async fn run(settings: &Settings) -> Result<()> {
    println!("{RULE}");
    println!("SAGA STORY ENGINE");
    println!("{RULE}");

    let mut engine = open_engine(settings).await?;
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    if !engine.has_story() {
        println!("\nNo existing story found");
        if !confirm(&mut lines, "Initialize new story? (y/n): ")? {
            println!("Exiting...");
            return Ok(());
        }
        let seed = load_seed(settings)?;
        print_initialized(engine.initialize_new_story(&seed).await?);
    }

    if let Some(memory) = engine.memory() {
        println!("\nStory: {}", memory.story_title);
        println!("Current chapter: {}", memory.current_chapter_number);
        println!("Characters: {}", memory.characters.len());
        println!("Open threads: {}", memory.open_threads().len());
    }

    loop {
        let next = engine
            .memory()
            .map(StoryMemory::next_chapter_number)
            .unwrap_or(1);
        println!("\nOptions:");
        println!("  1. Generate next chapter (Ch {next})");
        println!("  2. View story stats");
        println!("  3. Exit");

        let Some(choice) = prompt(&mut lines, "\nChoice: ")? else {
            break;
        };
        match choice.as_str() {
            "1" => match engine.generate_chapter().await {
                Ok(report) => print_report(&report),
                Err(e) => println!("\n[ERROR] {e}"),
            },
            "2" => match engine.stats() {
                Ok(stats) => {
                    println!("\n{RULE}\nSTORY STATISTICS\n{RULE}");
                    println!("{stats}");
                }
                Err(e) => println!("\n[ERROR] {e}"),
            },
            "3" => {
                println!("\nExiting...");
                break;
            }
            _ => println!("Invalid choice"),
        }
    }
    Ok(())
}

/// Read one trimmed line; `None` at end of input.
fn prompt<B: BufRead>(lines: &mut io::Lines<B>, text: &str) -> Result<Option<String>> {
    print!("{text}");
    io::stdout().flush()?;
    match lines.next() {
        Some(line) => Ok(Some(line?.trim().to_string())),
        None => Ok(None),
    }
}

fn confirm<B: BufRead>(lines: &mut io::Lines<B>, text: &str) -> Result<bool> {
    Ok(prompt(lines, text)?.is_some_and(|answer| answer.eq_ignore_ascii_case("y")))
}

pub fn print_initialized(memory: &StoryMemory) {
    println!("\n[OK] Initialized new story: {}", memory.story_title);
    println!("    - World: {}", memory.world_name);
    for character in memory.characters.values() {
        println!("    - {} ({})", character.name, character.role);
    }
    for thread in memory.plot_threads.values() {
        println!("    - Thread: {}", thread.name);
    }
}

pub fn print_report(report: &ChapterReport) {
    println!("\n[OK] Chapter {} complete!", report.chapter_number);
    println!("     Title: {}", report.title);
    println!("     Words: {}", report.word_count);
    if let Some(score) = report.quality_score {
        println!("     Quality: {score}/100 after {} revision(s)", report.revisions);
    }
    if report.violations.blocking() > 0 {
        println!(
            "     Unresolved continuity issues: {} critical, {} major",
            report.violations.critical, report.violations.major
        );
    }
    let updates = &report.updates;
    println!(
        "     Updates: {} new characters, {} threads introduced, {} resolved, {} events",
        updates.characters_added, updates.threads_introduced, updates.threads_resolved, updates.events_added
    );
    if let Some(phase) = report.arc_phase {
        println!("     Arc phase: {phase}");
    }
    println!("     File: {}", report.path.display());
}
