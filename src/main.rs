use gemscope::{Body, Client, Config, Line, Response, url::{is_gemini, with_input}};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;
use url::Url;

const CONFIG_PATH: &str = "gemscope.json";
const DEFAULT_URL: &str = "gemini://geminiprotocol.net/docs/protocol-specification.gmi";

fn print_line(line: &Line) {
    match line {
        Line::Heading { level, text } => println!("{} {text}", "#".repeat(*level)),
        Line::Text { content } => println!("{content}"),
        Line::Link { absolute_url, label, .. } if is_gemini(absolute_url) => println!("=> {label} <{absolute_url}>"),
        Line::Link { absolute_url, label, .. } => println!("=> {label} <{absolute_url}> (external)"),
        Line::ListItem { content } => println!("  • {content}"),
        Line::Quote { content } => println!("  > {content}"),
        Line::Preformatted { body, .. } => println!("{body}"),
    }
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

async fn browse(client: &Client, mut url: Url) -> Result<(), Box<dyn std::error::Error>> {
    let mut redirects = 0;

    loop {
        match client.request(url.clone()).await? {
            Response::Success { body: Body::Gemtext(lines), .. } => {
                lines.iter().for_each(print_line);
                return Ok(());
            }
            Response::Success { mime_type, body: Body::Raw(bytes), .. } => {
                println!("[{mime_type}, {} bytes]", bytes.len());
                return Ok(());
            }
            Response::Redirect { url: target, .. } => {
                redirects += 1;
                if redirects > client.config().max_redirects {
                    return Err(format!("too many redirects, last to {target}").into());
                }
                eprintln!("redirected to {target}");
                url = target;
            }
            Response::Input { prompt: label, .. } => {
                url = with_input(&url, &prompt(&label)?);
            }
            Response::Failure { code, information } | Response::CertificateRequired { code, information } => {
                return Err(format!("{code} {information}").into());
            }
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse(&std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string()))?;

    let config = Config::load_or_default(CONFIG_PATH)?;
    let client = Client::with_config(config)?;

    browse(&client, url).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
