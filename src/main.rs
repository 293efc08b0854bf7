use clap::{Arg, ArgMatches, Command};
use hlcockpit::{
    core::config::{AppConfig, CockpitSettings, YamlSettingsStore},
    core::envelope::ResultEnvelope,
    core::exchange::{Exchange, PredictionSource},
    core::risk::{RiskCalculator, RiskEstimate},
    core::types::{Direction, TradeOrderRequest},
    exchanges::{build_exchange, HttpPredictionSource},
    sync::{CockpitSession, FeedStatuses, InitialAggregator},
    trade::{SqliteTradeLogRepository, TradeLogStore, TradeSubmissionPipeline},
    utils::{build_alert_sink, init_logger},
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn cli() -> Command {
    Command::new("hlcockpit")
        .version("0.1.0")
        .about("Hyperliquid交易驾驶舱")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .default_value("config/app.yml")
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("risk")
                .about("估算所需保证金与强平价格")
                .arg(Arg::new("size").long("size").required(true))
                .arg(Arg::new("leverage").long("leverage").required(true))
                .arg(Arg::new("price").long("price").required(true))
                .arg(Arg::new("direction").long("direction").default_value("LONG")),
        )
        .subcommand(Command::new("snapshot").about("一次性加载账户、持仓、预测与交易日志"))
        .subcommand(Command::new("watch").about("持续轮询并显示连接状态，回车手动刷新"))
        .subcommand(
            Command::new("trade")
                .about("提交市价单")
                .arg(Arg::new("symbol").long("symbol"))
                .arg(Arg::new("direction").long("direction").required(true))
                .arg(Arg::new("size").long("size").required(true))
                .arg(Arg::new("leverage").long("leverage").default_value("1"))
                .arg(Arg::new("template").long("template")),
        )
        .subcommand(
            Command::new("logs")
                .about("查看最近的交易日志")
                .arg(Arg::new("limit").long("limit")),
        )
        .subcommand(
            Command::new("settings")
                .about("查看或修改驾驶舱设置")
                .arg(
                    Arg::new("set")
                        .long("set")
                        .value_name("KEY=VALUE")
                        .help("修改单个设置项"),
                ),
        )
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn arg_str<'a>(matches: &'a ArgMatches, name: &str) -> CliResult<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| format!("缺少参数 --{}", name).into())
}

fn arg_decimal(matches: &ArgMatches, name: &str) -> CliResult<Decimal> {
    let raw = arg_str(matches, name)?;
    Decimal::from_str(raw.trim())
        .map_err(|e| format!("参数 --{} 无效: {} ({})", name, raw, e).into())
}

fn arg_direction(matches: &ArgMatches) -> CliResult<Direction> {
    Ok(Direction::from_str(arg_str(matches, "direction")?)?)
}

fn open_log_store(config: &AppConfig) -> CliResult<Arc<TradeLogStore>> {
    let repository = SqliteTradeLogRepository::open(&config.database_path)?;
    Ok(Arc::new(TradeLogStore::new(Arc::new(repository))))
}

fn build_sources(
    config: &AppConfig,
) -> CliResult<(Arc<dyn Exchange>, Arc<dyn PredictionSource>)> {
    let exchange = build_exchange(&config.exchange)?;
    let predictions: Arc<dyn PredictionSource> = Arc::new(HttpPredictionSource::new(
        config.predictions_url.clone(),
        config.exchange.timeout_secs,
    )?);
    Ok((exchange, predictions))
}

fn run_risk(matches: &ArgMatches) -> CliResult<()> {
    let estimate = RiskCalculator::compute(
        arg_decimal(matches, "size")?,
        arg_decimal(matches, "leverage")?,
        arg_decimal(matches, "price")?,
        arg_direction(matches)?,
    );
    let envelope: ResultEnvelope<RiskEstimate> = if estimate.valid {
        ResultEnvelope::success("风险估算完成", estimate)
    } else {
        ResultEnvelope::failure_with_data("输入无效", "数量、杠杆与价格都必须大于0", estimate)
    };
    print_json(&envelope)
}

async fn run_snapshot(config: &AppConfig) -> CliResult<()> {
    let (exchange, predictions) = build_sources(config)?;
    let aggregator = InitialAggregator::new(exchange, predictions, open_log_store(config)?);
    let snapshot = aggregator.load().await;
    print_json(&snapshot)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WatchFrame {
    statuses: FeedStatuses,
    account_value: Option<Decimal>,
    open_positions: Option<usize>,
    predictions: Option<usize>,
}

async fn run_watch(config: &AppConfig, settings: &CockpitSettings) -> CliResult<()> {
    let (exchange, predictions) = build_sources(config)?;
    let alerts = build_alert_sink(settings.alerts_enabled, config.webhook.as_ref());
    let session = CockpitSession::start(exchange, predictions, settings, alerts);
    log::info!(
        "👀 开始监控: 账户刷新 {}ms, 预测刷新 {}ms (Ctrl+C 退出，回车手动刷新)",
        settings.account_refresh_interval_ms,
        settings.prediction_refresh_interval_ms
    );

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut last_printed: Option<String> = None;
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("收到退出信号，停止轮询");
                break;
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) => {
                        log::info!("🔄 手动刷新全部数据源");
                        session.refresh_all();
                    }
                    // 标准输入关闭后只靠 Ctrl+C 退出
                    Ok(None) | Err(_) => stdin_open = false,
                }
            }
            _ = ticker.tick() => {
                let frame = WatchFrame {
                    statuses: session.statuses(),
                    account_value: session.account().state().data.map(|a| a.account_value),
                    open_positions: session.positions().state().data.map(|p| p.len()),
                    predictions: session.predictions().state().data.map(|p| p.len()),
                };
                let text = serde_json::to_string(&frame)?;
                if last_printed.as_deref() != Some(text.as_str()) {
                    println!("{}", text);
                    last_printed = Some(text);
                }
            }
        }
    }

    session.stop();
    Ok(())
}

async fn run_trade(
    matches: &ArgMatches,
    config: &AppConfig,
    settings: &CockpitSettings,
) -> CliResult<()> {
    let symbol = matches
        .get_one::<String>("symbol")
        .cloned()
        .unwrap_or_else(|| config.default_symbol.clone());
    let mut request = TradeOrderRequest::new(
        symbol,
        arg_direction(matches)?,
        arg_decimal(matches, "size")?,
        arg_decimal(matches, "leverage")?,
    );
    if let Some(template) = matches.get_one::<String>("template") {
        request = request.with_template(template.clone());
    }

    let exchange = build_exchange(&config.exchange)?;
    let pipeline = TradeSubmissionPipeline::new(
        exchange,
        open_log_store(config)?,
        settings.trade_switch_enabled,
    );
    let envelope = pipeline.submit(request).await;
    print_json(&envelope)
}

async fn run_logs(matches: &ArgMatches, config: &AppConfig) -> CliResult<()> {
    let limit = match matches.get_one::<String>("limit") {
        Some(raw) => Some(
            raw.trim()
                .parse::<f64>()
                .map_err(|e| format!("参数 --limit 无效: {} ({})", raw, e))?,
        ),
        None => None,
    };
    let envelope = open_log_store(config)?.list(limit).await;
    print_json(&envelope)
}

fn run_settings(
    matches: &ArgMatches,
    store: &YamlSettingsStore,
    mut settings: CockpitSettings,
) -> CliResult<()> {
    let envelope = match matches.get_one::<String>("set") {
        None => ResultEnvelope::success("当前设置", settings),
        Some(assignment) => match assignment.split_once('=') {
            None => ResultEnvelope::failure("设置格式应为 KEY=VALUE", assignment.clone()),
            Some((key, value)) => match settings.update(store, key.trim(), value) {
                Ok(()) => ResultEnvelope::success("设置已保存", settings),
                Err(e) => ResultEnvelope::failure("设置保存失败", e.to_string()),
            },
        },
    };
    print_json(&envelope)
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let matches = cli().get_matches();
    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/app.yml");

    let config = AppConfig::load(config_path)?;
    init_logger(&config.log);

    let settings_store = YamlSettingsStore::open(&config.settings_path)?;
    let settings = CockpitSettings::load(&settings_store);
    log::debug!("驾驶舱设置: {:?}", settings);

    match matches.subcommand() {
        Some(("risk", sub)) => run_risk(sub),
        Some(("snapshot", _)) => run_snapshot(&config).await,
        Some(("watch", _)) => run_watch(&config, &settings).await,
        Some(("trade", sub)) => run_trade(sub, &config, &settings).await,
        Some(("logs", sub)) => run_logs(sub, &config).await,
        Some(("settings", sub)) => run_settings(sub, &settings_store, settings),
        _ => Err("未知子命令".into()),
    }
}
