//! # AddMe 合成 — 命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与结果输出。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use addme_merge::bridge::{MethodCall, MethodChannel};
use addme_merge::error::AppError;
use addme_merge::merge::{MergeConfig, MergeServiceState, OwnedMergeRequest};
use addme_merge::settings;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "addme", version, about = "把叠加帧中的人物合成到底图上")]
struct Cli {
    /// 设置文件（JSON），缺省字段使用默认值
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 性能档位：quality | balanced | speed
    #[arg(long, global = true, value_name = "NAME")]
    profile: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 执行一次合成并以 JSON 打印结果
    Merge {
        #[arg(long, value_name = "PATH")]
        base: String,
        #[arg(long, value_name = "PATH")]
        add: String,
        #[arg(long, value_name = "DIR")]
        project_dir: String,
        /// 蒙版文件：原始 8 位字节（需同时给出宽高）或灰度图片
        #[arg(long, value_name = "FILE")]
        mask: PathBuf,
        #[arg(long, requires = "mask_height")]
        mask_width: Option<u32>,
        #[arg(long, requires = "mask_width")]
        mask_height: Option<u32>,
    },
    /// 读取一条 MethodCall JSON（默认 stdin）并打印 MethodResponse
    Call {
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("❌ {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<String, AppError> {
    let service = MergeServiceState::with_config(resolve_cli_config(&cli)?);

    match cli.command {
        Command::Merge {
            base,
            add,
            project_dir,
            mask,
            mask_width,
            mask_height,
        } => {
            let (mask_data, mask_width, mask_height) = read_mask(&mask, mask_width.zip(mask_height))?;
            let result = service
                .merge(OwnedMergeRequest {
                    base_path: base,
                    add_path: add,
                    project_dir,
                    mask_data,
                    mask_width,
                    mask_height,
                })
                .await?;
            Ok(serde_json::to_string_pretty(&result)?)
        }
        Command::Call { input } => {
            let raw = match input {
                Some(path) => fs::read_to_string(path)?,
                None => {
                    let mut buffer = String::new();
                    io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };
            let call: MethodCall = serde_json::from_str(&raw)?;
            let response = MethodChannel::new(service).handle(call).await;
            Ok(serde_json::to_string_pretty(&response)?)
        }
    }
}

/// `--profile` 先于设置文件中的细项参数生效，细项参数不会被档位覆盖。
fn resolve_cli_config(cli: &Cli) -> Result<MergeConfig, AppError> {
    settings::resolve_config(cli.config.as_deref(), cli.profile.as_deref())
}

/// 给出宽高时按原始字节读取，否则按图片解码为灰度。
fn read_mask(path: &Path, dims: Option<(u32, u32)>) -> Result<(Vec<u8>, u32, u32), AppError> {
    match dims {
        Some((width, height)) => Ok((fs::read(path)?, width, height)),
        None => {
            let image = image::open(path)
                .map_err(|e| AppError::Args(format!("无法解码蒙版图片 '{}': {}", path.display(), e)))?
                .to_luma8();
            let (width, height) = image.dimensions();
            Ok((image.into_raw(), width, height))
        }
    }
}
