use std::io::{self, Write};

use colored::Colorize;
use tracing::warn;
use uuid::Uuid;

use crate::auth::authorize::parse_callback;
use crate::auth::session::Session;
use crate::error::Error;

/// Interactive authorization: print the consent URL, optionally open a
/// browser, prompt for the pasted redirect URL, and exchange the code.
pub async fn run_auth(session: &Session, open_browser: bool) -> Result<(), Error> {
    if session.is_authenticated().await {
        println!("Already authenticated; tokens are still valid.");
        if !confirm("Re-authenticate anyway? (y/N): ")? {
            println!("Keeping the existing session.");
            return Ok(());
        }
        session.logout().await;
    }

    let state = Uuid::new_v4().to_string();
    let url = session.authorization_url(Some(&state)).await;

    println!("\nOpen this URL in your browser and sign in:\n\n  {url}\n");
    if open_browser {
        if webbrowser::open(&url).is_ok() {
            println!("{}", "Browser opened.".dimmed());
        } else {
            warn!("could not open a browser; copy the URL manually");
        }
    }
    println!("After granting access you will land on the redirect URI.");

    let callback_url = prompt_nonempty("Paste the full redirect URL here: ")?;
    let (code, returned_state) = parse_callback(callback_url.trim())?;
    if returned_state.as_deref() != Some(state.as_str()) {
        eprintln!(
            "{}",
            "Warning: state parameter mismatch; continuing anyway".yellow()
        );
    }

    session.exchange_code(&code).await?;

    match session.token_expiry().await {
        Some(expiry) => println!(
            "{} Authenticated; token expires {}",
            "OK".green().bold(),
            expiry.to_rfc3339()
        ),
        None => println!("{} Authenticated", "OK".green().bold()),
    }
    println!("Tokens saved to {}", session.store().path().display());
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool, Error> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn prompt_nonempty(prompt: &str) -> Result<String, Error> {
    loop {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
        eprintln!("Nothing entered; try again.");
    }
}
