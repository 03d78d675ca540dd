//! 操作员交互
//!
//! 登录由操作员在浏览器里手动完成，程序只在关键节点阻塞等待确认。

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{AppError, AppResult};

/// 提示并读取一行输入
pub async fn ask<R, W>(reader: &mut R, writer: &mut W, message: &str) -> AppResult<String>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let io_err = |e: std::io::Error| AppError::Other(format!("读取输入失败: {}", e));
    writer.write_all(message.as_bytes()).await.map_err(io_err)?;
    writer.flush().await.map_err(io_err)?;

    let mut line = String::new();
    reader.read_line(&mut line).await.map_err(io_err)?;
    Ok(line.trim().to_string())
}

/// 提示并读取一行，空输入时返回默认值
pub async fn ask_with_default<R, W>(
    reader: &mut R,
    writer: &mut W,
    message: &str,
    default: &str,
) -> AppResult<String>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let answer = ask(reader, writer, message).await?;
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer
    })
}

/// 在标准输入上等待回车
pub async fn wait_for_enter(message: &str) -> AppResult<()> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    ask(&mut stdin, &mut stdout, message).await?;
    Ok(())
}

/// 在标准输入上询问数据文件路径
pub async fn ask_data_file(default: &str) -> AppResult<String> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let message = format!("📁 数据文件 (回车使用 '{}'): ", default);
    ask_with_default(&mut stdin, &mut stdout, &message, default).await
}
