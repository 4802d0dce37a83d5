// ==========================================
// 发酵批次与罐位分配引擎 - 命令行入口
// ==========================================
// 用法:
//   brew-alloc [--db <path>] [--tenant <id>] [--user <id>] <command> [args]
//
// 命令:
//   init-db                 建表 / 升级 schema
//   allocate <json|@file>   执行分配
//   availability <json|@file>  只读预检
//   lineage <lot_id>        查询酒批谱系
//   history [limit]         最近的分配审计
//   config-get              查看全局配置
//   config-set <key> <val>  写入全局配置
// ==========================================
// 输出: 成功时 stdout 输出 JSON; 失败时 stdout 输出错误 JSON, 退出码 1
// ==========================================

use anyhow::{anyhow, bail, Context, Result};
use brew_lot_allocation::api::{AllocationApi, ApiError};
use brew_lot_allocation::config::ConfigManager;
use brew_lot_allocation::db::{get_default_db_path, init_schema, open_sqlite_connection};
use brew_lot_allocation::domain::{AllocationRequest, RequestContext};
use brew_lot_allocation::{logging, APP_NAME, VERSION};
use serde::Serialize;
use std::sync::{Arc, Mutex};

const TENANT_ENV: &str = "BREW_ALLOC_TENANT";
const USER_ENV: &str = "BREW_ALLOC_USER";

#[derive(Debug, Default)]
struct CliArgs {
    db_path: Option<String>,
    tenant_id: Option<String>,
    user_id: Option<String>,
    command: Vec<String>,
}

fn parse_args() -> Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--db" => parsed.db_path = Some(args.next().context("--db 缺少参数")?),
            "--tenant" => parsed.tenant_id = Some(args.next().context("--tenant 缺少参数")?),
            "--user" => parsed.user_id = Some(args.next().context("--user 缺少参数")?),
            _ => parsed.command.push(arg),
        }
    }
    Ok(parsed)
}

impl CliArgs {
    fn context(&self) -> Result<RequestContext> {
        let tenant = self
            .tenant_id
            .clone()
            .or_else(|| std::env::var(TENANT_ENV).ok())
            .ok_or_else(|| anyhow!("缺少租户: 使用 --tenant 或环境变量 {}", TENANT_ENV))?;
        let user = self
            .user_id
            .clone()
            .or_else(|| std::env::var(USER_ENV).ok())
            .ok_or_else(|| anyhow!("缺少操作人: 使用 --user 或环境变量 {}", USER_ENV))?;
        Ok(RequestContext::new(tenant, user))
    }
}

/// 参数以 @ 开头时从文件读取
fn read_body(arg: Option<&String>) -> Result<String> {
    let raw = arg.context("缺少请求体")?;
    match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("读取 {} 失败", path)),
        None => Ok(raw.clone()),
    }
}

/// 解析请求体, 解析失败归为 INVALID_INPUT
fn parse_request(body: &str) -> Result<AllocationRequest, ApiError> {
    serde_json::from_str(body)
        .map_err(|e| ApiError::InvalidInput(format!("请求体解析失败: {}", e)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// 业务结果输出: 成功打印结果, 失败原样返回
fn emit<T: Serialize>(result: Result<T, ApiError>) -> Result<(), ApiError> {
    let value = result?;
    print_json(&value).map_err(|e| ApiError::InternalError(e.to_string()))
}

/// 业务错误输出为结构化 JSON
fn print_api_error(err: &ApiError) -> Result<()> {
    print_json(&err.to_response())
}

fn print_usage() {
    eprintln!("{} v{}", APP_NAME, VERSION);
    eprintln!("用法: brew-alloc [--db <path>] [--tenant <id>] [--user <id>] <command> [args]");
    eprintln!("命令: init-db | allocate <json|@file> | availability <json|@file> | lineage <lot_id> | history [limit] | config-get | config-set <key> <value>");
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let args = parse_args()?;
    let db_path = args.db_path.clone().unwrap_or_else(get_default_db_path);
    tracing::debug!(db_path = %db_path, "使用数据库");

    let Some(command) = args.command.first() else {
        print_usage();
        bail!("缺少命令");
    };

    let outcome: Result<(), ApiError> = match command.as_str() {
        "init-db" => {
            let conn = open_sqlite_connection(&db_path)?;
            init_schema(&conn)?;
            tracing::info!(db_path = %db_path, "schema 已就绪");
            print_json(&serde_json::json!({ "db_path": db_path, "status": "ok" }))?;
            Ok(())
        }
        "allocate" => {
            let ctx = args.context()?;
            let body = read_body(args.command.get(1))?;
            let api = AllocationApi::open(&db_path)?;
            emit(api.allocate_json(&ctx, &body).await)
        }
        "availability" => {
            let ctx = args.context()?;
            let body = read_body(args.command.get(1))?;
            let request = parse_request(&body);
            let api = AllocationApi::open(&db_path)?;
            emit(request.and_then(|r| api.check_availability(&ctx, &r)))
        }
        "lineage" => {
            let ctx = args.context()?;
            let lot_id = args.command.get(1).context("缺少酒批ID")?;
            let api = AllocationApi::open(&db_path)?;
            emit(api.lot_lineage(&ctx, lot_id))
        }
        "history" => {
            let ctx = args.context()?;
            let limit = match args.command.get(1) {
                Some(raw) => raw.parse::<i64>().with_context(|| format!("无效的 limit: {}", raw))?,
                None => 20,
            };
            let api = AllocationApi::open(&db_path)?;
            emit(api.recent_allocations(&ctx, limit))
        }
        "config-get" => {
            let conn = open_sqlite_connection(&db_path)?;
            init_schema(&conn)?;
            let config = ConfigManager::from_connection(Arc::new(Mutex::new(conn)));
            let values = config.list_global_config().map_err(|e| anyhow!(e))?;
            print_json(&values)?;
            Ok(())
        }
        "config-set" => {
            let key = args.command.get(1).context("缺少配置键")?;
            let value = args.command.get(2).context("缺少配置值")?;
            let conn = open_sqlite_connection(&db_path)?;
            init_schema(&conn)?;
            let config = ConfigManager::from_connection(Arc::new(Mutex::new(conn)));
            config
                .set_global_config_value(key, value)
                .map_err(|e| anyhow!(e))?;
            tracing::info!(key = %key, value = %value, "全局配置已更新");
            Ok(())
        }
        other => {
            print_usage();
            bail!("未知命令: {}", other);
        }
    };

    if let Err(e) = outcome {
        print_api_error(&e)?;
        std::process::exit(1);
    }
    Ok(())
}
