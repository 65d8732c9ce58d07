// src/main.rs
use annotator_rs::config::AnnotatorConfig;
use annotator_rs::utils::document_processor::DocumentProcessor;
use anyhow::Context;
use log::info;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Optional JSON config; otherwise the default layout under the working directory
    let config = match std::env::args_os().nth(1) {
        Some(path) => AnnotatorConfig::from_json_file(&path)?,
        None => {
            let current_dir = std::env::current_dir().context("Failed to resolve working directory")?;
            AnnotatorConfig::rooted_at(&current_dir)
        }
    };

    info!("Comment table: {}", config.comments_path.display());
    let processor = DocumentProcessor::new(config);
    let report = processor
        .process_documents()
        .context("Cannot continue without the comment table")?;

    println!("✅ 共成功处理 {} 个文件", report.succeeded());
    if report.failed() > 0 {
        println!("⚠️  {} 个文件处理失败，详见日志", report.failed());
    }
    println!("📂 结果保存在: {}", report.output_dir.display());

    Ok(())
}
