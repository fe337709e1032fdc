use alloy::signers::local::PrivateKeySigner;
use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::value::RawValue;
use serde_json::Value;

use don_gateway::api::{JsonRpcCodec, Message, Request};

const PRIVATE_KEY_ENV: &str = "GATEWAY_CLI_PRIVATE_KEY";

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Send requests to a DON gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:5002/")]
    url: String,

    /// Value of the Authorization header
    #[arg(short, long)]
    auth: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a JSON-RPC request routed by service name
    Request {
        /// Method as `<service>.<method>`
        #[arg(short, long)]
        method: String,
        /// Params as a JSON document
        #[arg(short, long)]
        params: Option<String>,
        #[arg(long, default_value = "1")]
        id: String,
    },
    /// Send a signed legacy message routed by DON ID (key from GATEWAY_CLI_PRIVATE_KEY)
    Legacy {
        #[arg(short, long)]
        don_id: String,
        #[arg(short, long)]
        method: String,
        /// Payload as a JSON document
        #[arg(short, long)]
        payload: Option<String>,
        #[arg(long)]
        message_id: Option<String>,
        #[arg(long, default_value = "")]
        receiver: String,
    },
}

fn raw_json(text: Option<String>) -> Result<Option<Box<RawValue>>, serde_json::Error> {
    text.map(RawValue::from_string).transpose()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(auth) = &cli.auth {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(auth)?);
    }

    let body = match cli.command {
        Commands::Request { method, params, id } => {
            serde_json::to_vec(&Request::new(id, method, raw_json(params)?))?
        }
        Commands::Legacy {
            don_id,
            method,
            payload,
            message_id,
            receiver,
        } => {
            let key = std::env::var(PRIVATE_KEY_ENV)
                .map_err(|_| format!("{} must hold a hex private key", PRIVATE_KEY_ENV))?;
            let signer: PrivateKeySigner = key.trim_start_matches("0x").parse()?;

            let mut message = Message::default();
            message.body.message_id = message_id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
            message.body.method = method;
            message.body.routing_key = don_id;
            message.body.receiver = receiver;
            message.body.payload = raw_json(payload)?;
            message.sign(&signer)?;
            serde_json::to_vec(&JsonRpcCodec.legacy_request(&message)?)?
        }
    };

    let res = client.post(&cli.url).headers(headers).body(body).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    println!("Status: {}", status);
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
