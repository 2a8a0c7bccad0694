//! Line-oriented driver for one mounted simulation.

use std::error::Error;

use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

use services::{AppServices, Notice, SessionController, SessionPhase, SessionRuntime, SessionView};

const HELP: &str = "commands: <n> pick option n, s submit, n next, p previous, \
g <i> go to question i, f flag, r restart (when finished), q quit";

/// Mount the route in `url`, run the auto-save tasks and read commands from
/// stdin until `q` or end of input. The final save happens on the way out.
pub async fn drive(services: &AppServices, mut url: Url) -> Result<(), Box<dyn Error>> {
    let request = services.parse_launch(&mut url)?;
    let controller = services.controller();
    let report = controller.mount(&request).await?;
    tracing::info!(simulation_id = %report.simulation_id, decision = ?report.decision, "mounted");

    if controller.take_notice().await == Some(Notice::ProgressReset) {
        println!("Progress for this simulation was reset.");
    }
    let runtime = SessionRuntime::start(controller.clone(), services.config()).await;

    render(&controller).await;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "q" {
            break;
        }
        if let Err(err) = dispatch(&controller, line).await {
            println!("! {err}");
        }
        render(&controller).await;
    }

    runtime.shutdown().await;
    Ok(())
}

async fn dispatch(controller: &SessionController, line: &str) -> Result<(), Box<dyn Error>> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (None, _) => {}
        (Some("s"), None) => {
            controller.submit_answer().await?;
        }
        (Some("n"), None) => {
            controller.next_question().await?;
        }
        (Some("p"), None) => {
            controller.previous_question().await?;
        }
        (Some("f"), None) => {
            controller.toggle_flag().await?;
        }
        (Some("r"), None) => {
            controller.restart().await?;
        }
        (Some("g"), Some(raw)) => {
            let shown: usize = raw.parse()?;
            controller.navigate_to(shown.saturating_sub(1)).await?;
        }
        (Some(raw), None) if raw.chars().all(|c| c.is_ascii_digit()) => {
            let shown: usize = raw.parse()?;
            controller.select_answer(shown.saturating_sub(1)).await?;
        }
        _ => println!("{HELP}"),
    }
    Ok(())
}

async fn render(controller: &SessionController) {
    match controller.phase().await {
        SessionPhase::Loading => println!("loading..."),
        SessionPhase::Empty(empty) => {
            println!("{}", empty.message);
            println!("back: {}", empty.back_target);
        }
        SessionPhase::Active | SessionPhase::Complete => {
            if let Some(view) = controller.view().await {
                print_view(&view);
            }
        }
    }
}

fn print_view(view: &SessionView) {
    if view.phase == SessionPhase::Complete {
        println!(
            "{} finished: {}/{} correct, score {}",
            view.simulation_id,
            view.breakdown.correct,
            view.total,
            view.display_score()
        );
        return;
    }

    let mut header = format!(
        "[{}/{}] {}",
        view.current_index + 1,
        view.total,
        view.simulation_id
    );
    if let Some(secs) = view.remaining_time {
        header.push_str(&format!("  {:02}:{:02} left", secs / 60, secs % 60));
    }
    if view.flagged {
        header.push_str("  (flagged)");
    }
    println!("{header}");

    let Some(question) = &view.question else {
        return;
    };
    println!("{}", question.prompt);
    for (i, option) in question.options.iter().enumerate() {
        let marker = if question.correct_option == Some(i) {
            '+'
        } else if view.submitted == Some(i) {
            '*'
        } else if view.selection == Some(i) {
            '>'
        } else {
            ' '
        };
        println!(" {marker} {}. {option}", i + 1);
    }
    if let Some(explanation) = &question.explanation {
        println!("  {explanation}");
    }
    if view.locked {
        println!("  (answered; locked under exam rules)");
    }
}
