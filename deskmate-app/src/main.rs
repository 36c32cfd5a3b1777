use anyhow::{Context, Result};
use deskmate_app::{build_engine, init_logging, AppConfig};
use deskmate_core::{Attachment, ConversationLoop, DeltaRelay, TurnRequest};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "命令: /memory 查看记忆, /attach <路径> 为下一条消息添加附件, /exit 退出";

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path)?;
    config.apply_env();
    if let Err(e) = config.validate() {
        eprintln!("❌ Invalid configuration: {}", e);
        eprintln!("💡 Tip: edit {} or set ANTHROPIC_API_KEY", config_path.display());
        return Err(e);
    }

    let engine = build_engine(&config).await?;

    println!("Deskmate ({})", config.model.model);
    println!("{}", HELP);
    println!();

    repl(&engine).await
}

async fn repl(engine: &ConversationLoop) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: Vec<Attachment> = Vec::new();
    let mut last_update = None;

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/exit" | "/quit" => break,
            "/memory" => {
                println!("{}", engine.memory().get().await);
                continue;
            }
            "/help" => {
                println!("{}", HELP);
                continue;
            }
            _ => {}
        }

        if let Some(path) = line.strip_prefix("/attach ") {
            match Attachment::from_path(path.trim()).await {
                Ok(attachment) => {
                    println!("📎 {} ({})", attachment.file_name, attachment.mime_type);
                    pending.push(attachment);
                }
                Err(e) => eprintln!("❌ {}", e),
            }
            continue;
        }

        let request = TurnRequest {
            text: line.to_string(),
            attachments: std::mem::take(&mut pending),
        };

        let (relay, printer) = DeltaRelay::spawn(|delta| {
            print!("{}", delta.fragment);
            let _ = std::io::stdout().flush();
        });
        let result = engine.run(request, &relay).await;
        drop(relay);
        let _ = printer.await;
        println!();

        match result {
            Ok(outcome) => {
                if outcome.reached_iteration_ceiling {
                    println!("⚠️  已达到单轮最多 {} 次模型调用", outcome.iterations);
                }
                println!(
                    "[tokens: {} in / {} out, {} calls]",
                    outcome.input_tokens, outcome.output_tokens, outcome.iterations
                );
                last_update = Some(outcome.memory_update);
            }
            Err(e) => eprintln!("❌ {}", e),
        }
    }

    // Let the final memory update land before the runtime shuts down.
    if let Some(update) = last_update {
        let _ = update.await;
    }
    Ok(())
}
