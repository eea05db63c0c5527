//! CLI front end: stdin/stdout REPL over a single dialogue session.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::advisor::catalog::CatalogView;
use crate::advisor::session::{DialogueManager, DialogueSession, PresentationPayload};
use crate::error::DialogueError;

/// Format whole rupees with thousands separators, e.g. `₹1,000,000`.
pub fn format_rupees(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("₹{out}")
}

fn render_dashboard(view: &CatalogView) -> String {
    let entry = &view.entry;
    let mut lines = vec![
        format!("  {}", entry.description),
        String::new(),
        "  💰 Estimated Expenses".to_string(),
        format!("     11th-12th Coaching: {}", format_rupees(entry.coaching_fee)),
        format!(
            "     College (Total):    {} - {}",
            format_rupees(entry.college_fee_min),
            format_rupees(entry.college_fee_max)
        ),
        format!("     Min Investment:     {}", format_rupees(view.min_investment)),
        String::new(),
        "  🚀 Career & Salary".to_string(),
    ];
    for career in &entry.careers {
        lines.push(format!(
            "     {}: ~{}/year",
            career.role,
            format_rupees(career.average_salary)
        ));
    }
    lines.push(String::new());
    lines.push("  ⚠️  Fees vary by city and college rank.".to_string());
    lines.join("\n")
}

/// Text shown for one payload.
pub fn render_payload(payload: &PresentationPayload) -> String {
    let mut out = payload.assistant_message.clone();
    if let Some(stream) = payload.recommended_stream {
        out.push_str(&format!("\n\n🎉 Final Recommendation: {stream}\n"));
        match &payload.catalog {
            Some(view) => {
                out.push('\n');
                out.push_str(&render_dashboard(view));
            }
            None if payload.financials_unavailable => {
                out.push_str("  (Financial details are not available for this stream.)");
            }
            None => {}
        }
    }
    out
}

/// Run the REPL until EOF or `/quit`. `/reset` starts a new session.
pub async fn run_repl(manager: Arc<DialogueManager>) -> anyhow::Result<()> {
    let mut session = DialogueSession::new();
    println!("\n{}\n", session.greeting());
    eprint!("> ");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {
                eprint!("> ");
                continue;
            }
            "/quit" | "/exit" => break,
            "/reset" => {
                session = DialogueSession::new();
                tracing::info!(session_id = %session.id(), "Session reset");
                println!("\n{}\n", session.greeting());
                eprint!("> ");
                continue;
            }
            _ => {}
        }

        eprintln!("⏳ Thinking...");
        match manager.handle_turn(&mut session, line).await {
            Ok(payload) => println!("\n{}\n", render_payload(&payload)),
            Err(DialogueError::EmptyInput) => {}
            Err(e) => tracing::error!("Turn failed: {e}"),
        }
        eprint!("> ");
    }
    Ok(())
}
