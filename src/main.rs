use anyhow::Result;
use nfse_batch::utils::logging;
use nfse_batch::{App, Config};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(config.verbose_logging);
    if let Some(path) = &config.source_file {
        info!("读取配置文件: {}", path);
    }

    // 初始化并运行应用
    let app = match App::initialize(config).await {
        Ok(app) => app,
        Err(e) => {
            error!("❌ 初始化失败: {:#}", e);
            return Err(e);
        }
    };
    app.run().await?;

    Ok(())
}
