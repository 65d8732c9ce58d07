use annotator_rs::config::AnnotatorConfig;
use annotator_rs::core::comments::CommentTable;
use annotator_rs::utils::document_processor::DocumentProcessor;

/// Show which homework files would receive a comment, without writing anything.
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = match std::env::args_os().nth(1) {
        Some(path) => AnnotatorConfig::from_json_file(&path)?,
        None => AnnotatorConfig::rooted_at(&std::env::current_dir()?),
    };

    let comments = CommentTable::load(&config.comments_path, config.header_row)?;
    println!("Loaded {} comments from {}", comments.len(), config.comments_path.display());

    let processor = DocumentProcessor::new(config);
    for file in processor.homework_files()? {
        let status = match file.student_id.as_deref() {
            None => "no student id".to_string(),
            Some(id) => match comments.get(id) {
                Some(comment) => format!("[{}] {}", id, comment),
                None => format!("[{}] no comment", id),
            },
        };
        println!("{:<40} {}", file.file_name(), status);
    }

    Ok(())
}
