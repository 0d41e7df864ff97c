//! hairgator-cli — command-line client for the HairGator chat API
//!
//! # Subcommands
//! - `chat <message> [--user <id>] [--conversation <id>] [--image-url <url>] [--no-rag] [--json]`
//! - `search <query> [-n <limit>] [--json]` — style table lookup
//! - `status`                               — show server health

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
const DEFAULT_USER: &str = "cli";
const DEFAULT_LIMIT: usize = 3;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "hairgator-cli", version, about = "HairGator professional hair recipe chat client")]
struct Cli {
    /// HairGator HTTP server URL (overrides HAIRGATOR_HTTP_URL env var)
    #[arg(long, env = "HAIRGATOR_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send one chat message
    Chat {
        /// Question for the recipe assistant
        message: String,

        /// User id the conversation belongs to
        #[arg(long, default_value = DEFAULT_USER)]
        user: String,

        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Attach a hair photo by URL
        #[arg(long)]
        image_url: Option<String>,

        /// Skip the style table lookup
        #[arg(long)]
        no_rag: bool,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Search the style table
    Search {
        query: String,

        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Show HairGator server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatReply {
    pub conversation_id: String,
    pub message: String,
    pub timestamp: String,
    pub message_type: String,
    #[serde(default)]
    pub additional_data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct StyleHit {
    pub model_no: String,
    #[serde(default)]
    pub introduction_kor: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub formula_42: String,
    #[serde(default)]
    pub score: u32,
}

#[derive(Debug, Deserialize)]
pub struct StyleSearchResponse {
    pub query: String,
    pub count: usize,
    pub results: Vec<StyleHit>,
}

// ============================================================================
// Formatting
// ============================================================================

pub fn chat_body(
    user: &str,
    message: &str,
    conversation: Option<&str>,
    image_url: Option<&str>,
    use_rag: bool,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "user_id": user,
        "message": message,
        "use_rag": use_rag,
    });
    if let Some(id) = conversation {
        body["conversation_id"] = serde_json::json!(id);
    }
    if let Some(url) = image_url {
        body["image_url"] = serde_json::json!(url);
    }
    body
}

/// Reply text followed by a footer naming the conversation and the styles consulted.
pub fn format_chat_reply(reply: &ChatReply) -> String {
    let mut out = format!("{}\n\n-- conversation {}", reply.message.trim_end(), reply.conversation_id);

    let styles: Vec<&str> = reply.additional_data["rag_styles"]
        .as_array()
        .map(|ids| ids.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    if !styles.is_empty() {
        out.push_str(&format!(" · styles {}", styles.join(", ")));
    }
    if reply.additional_data["follow_up"].as_bool() == Some(true) {
        out.push_str(" · follow-up");
    }
    out
}

pub fn format_style_hit(hit: &StyleHit) -> String {
    let title = if hit.introduction_kor.is_empty() {
        "(no introduction)"
    } else {
        hit.introduction_kor.as_str()
    };
    let mut out = format!("{}  {}  [score {}]", hit.model_no, title, hit.score);
    if !hit.subtitle.is_empty() {
        out.push_str(&format!("\n    {}", hit.subtitle));
    }
    if !hit.formula_42.is_empty() {
        out.push_str(&format!("\n    42: {}", hit.formula_42));
    }
    out
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

fn check_status(resp: reqwest::blocking::Response) -> reqwest::blocking::Response {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("hairgator-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }
    resp
}

fn do_chat(server: &str, body: serde_json::Value, json_output: bool) -> anyhow::Result<()> {
    // Recipe generation can take a while on larger models
    let client = client(180)?;
    let url = format!("{}/chat", server);

    let resp = match client.post(&url).json(&body).send() {
        Ok(r) => check_status(r),
        Err(e) => {
            eprintln!("hairgator-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if json_output {
        let raw: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&raw)?);
        return Ok(());
    }

    let reply: ChatReply = match resp.json() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("hairgator-cli: failed to parse chat response: {}", e);
            std::process::exit(1);
        }
    };
    println!("{}", format_chat_reply(&reply));
    Ok(())
}

fn do_search(server: &str, query: &str, limit: usize, json_output: bool) -> anyhow::Result<()> {
    let client = client(30)?;
    let url = format!("{}/styles/search", server);
    let limit = limit.to_string();

    let resp = match client
        .get(&url)
        .query(&[("query", query), ("limit", limit.as_str())])
        .send()
    {
        Ok(r) => check_status(r),
        Err(e) => {
            eprintln!("hairgator-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if json_output {
        let raw: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&raw["results"])?);
        return Ok(());
    }

    let search: StyleSearchResponse = match resp.json() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("hairgator-cli: failed to parse search response: {}", e);
            std::process::exit(1);
        }
    };

    if search.results.is_empty() {
        eprintln!("No styles found for: {}", search.query);
        return Ok(());
    }
    for hit in &search.results {
        println!("{}\n", format_style_hit(hit));
    }
    eprintln!("{} result(s)", search.count);
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = client(10)?;
    let url = format!("{}/health", server);

    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            let services = &body["services"];
            let data = &body["data"];
            println!("HairGator server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:          {}", body["version"].as_str().unwrap_or("?"));
            println!("History store:    {}", services["conversation_store"].as_str().unwrap_or("?"));
            println!("Completion:       {}", services["completion"].as_str().unwrap_or("?"));
            println!("Vision:           {}", services["vision"].as_str().unwrap_or("?"));
            println!("Styles loaded:    {}", data["rag_styles"].as_u64().unwrap_or(0));
        }
        Ok(r) => {
            eprintln!("hairgator-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("hairgator-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Chat {
            message,
            user,
            conversation,
            image_url,
            no_rag,
            json,
        } => {
            let body = chat_body(&user, &message, conversation.as_deref(), image_url.as_deref(), !no_rag);
            do_chat(&server, body, json)
        }
        Commands::Search { query, limit, json } => do_search(&server, &query, limit, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("hairgator-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
