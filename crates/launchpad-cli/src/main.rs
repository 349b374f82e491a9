//! 런치패드 시세 스트림 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 1분봉 캔들과 체결 모니터링
//! launchpad watch --token 0xTOKEN --channels kline,trade --interval 1m
//!
//! # 설정 파일 지정 + JSON 출력
//! launchpad watch -c config/launchpad.toml --token 0xTOKEN --json
//!
//! # 유효 설정 확인
//! launchpad check-config
//! ```

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use launchpad_core::{init_logging, parse_channels, AppConfig, LogConfig};
use tracing::error;

use launchpad_cli::commands::check_config::render_config;
use launchpad_cli::commands::watch::{run_watch, WatchConfig};

#[derive(Parser)]
#[command(name = "launchpad")]
#[command(about = "Launchpad market stream CLI - 실시간 캔들/체결 모니터링", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 (기본: config/launchpad.toml이 있으면 사용)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 토큰 구독 후 Ctrl-C까지 실시간 데이터 출력
    Watch {
        /// 토큰 주소
        #[arg(short, long)]
        token: String,

        /// 구독 채널 (쉼표로 구분: kline, trade)
        #[arg(long, default_value = "kline,trade")]
        channels: String,

        /// 캔들 인터벌 (여러 개는 쉼표로 구분, 예: 1m,5m)
        #[arg(short, long, value_delimiter = ',')]
        interval: Vec<String>,

        /// 실시간 데이터만 수신
        #[arg(long, default_value = "false")]
        real_time_only: bool,

        /// 시세 데이터를 JSON 한 줄로 출력
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// 파일과 환경 변수가 병합된 유효 설정 출력
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let app = match &cli.config {
        Some(path) => AppConfig::load(Some(path.as_path()))?,
        None => AppConfig::load_default()?,
    };

    match cli.command {
        Commands::Watch {
            token,
            channels,
            interval,
            real_time_only,
            json,
        } => {
            init_logging(LogConfig::from_settings(&app.logging))
                .map_err(|e| anyhow!("로깅 초기화 실패: {}", e))?;

            let watch = WatchConfig {
                token,
                channels: parse_channels(&channels)?,
                intervals: interval,
                real_time_only,
                json,
            };

            if let Err(e) = run_watch(&app, watch).await {
                error!("Watch failed: {:#}", e);
                return Err(e);
            }
        }

        Commands::CheckConfig => {
            println!("{}", render_config(&app)?);
        }
    }

    Ok(())
}
