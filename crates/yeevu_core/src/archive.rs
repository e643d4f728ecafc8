//! Zip export of a generated project.

use std::io::{Cursor, Write};
use std::sync::Arc;

use tracing::{debug, info, warn};
use yeevu_sandbox::Sandbox;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{PipelineError, PipelineResult};

/// Attachment name for a sandbox's project archive.
pub fn archive_file_name(sandbox_id: &str) -> String {
    let short: String = sandbox_id.chars().take(8).collect();
    format!("website-project-{}.zip", short)
}

/// Download every project file and pack them into a deflated zip.
///
/// Dependency and build directories are skipped by the sandbox listing.
pub async fn build_archive(sandbox: &Arc<dyn Sandbox>, project_dir: &str) -> PipelineResult<Vec<u8>> {
    let files = sandbox.list_files(project_dir).await?;
    if files.is_empty() {
        return Err(PipelineError::Archive(format!(
            "no project files found in {}",
            project_dir
        )));
    }

    let mut buf = Cursor::new(Vec::new());
    let mut packed = 0;
    {
        let mut zip = ZipWriter::new(&mut buf);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for relative in &files {
            let path = format!("{}/{}", project_dir.trim_end_matches('/'), relative);
            let Some(content) = sandbox.download_file(&path).await? else {
                warn!("{} disappeared before it could be archived", relative);
                continue;
            };
            debug!("Archiving {} ({} bytes)", relative, content.len());
            zip.start_file(relative.as_str(), options)?;
            zip.write_all(&content)?;
            packed += 1;
        }
        zip.finish()?;
    }

    let bytes = buf.into_inner();
    info!("Archived {} files, {} bytes", packed, bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use yeevu_sandbox::MockSandbox;
    use zip::ZipArchive;

    #[test]
    fn test_archive_file_name() {
        assert_eq!(
            archive_file_name("588af709-5b5a-4321-a399-547076a9a223"),
            "website-project-588af709.zip"
        );
        assert_eq!(archive_file_name("abc"), "website-project-abc.zip");
    }

    #[tokio::test]
    async fn test_build_archive_packs_project_files() {
        let mock = MockSandbox::default()
            .with_file("/p/package.json", "{}")
            .with_file("/p/app/page.tsx", "export default function Page() {}")
            .with_file("/p/node_modules/react/index.js", "module.exports = {}")
            .with_file("/p/dev-server.log", "ready");
        let sandbox: Arc<dyn Sandbox> = Arc::new(mock);

        let bytes = build_archive(&sandbox, "/p").await.unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(names, vec!["app/page.tsx", "package.json"]);

        let mut page = String::new();
        archive
            .by_name("app/page.tsx")
            .unwrap()
            .read_to_string(&mut page)
            .unwrap();
        assert!(page.starts_with("export default"));
    }

    #[tokio::test]
    async fn test_empty_project_is_an_error() {
        let sandbox: Arc<dyn Sandbox> = Arc::new(MockSandbox::default());
        let result = build_archive(&sandbox, "/p").await;
        assert!(matches!(result, Err(PipelineError::Archive(_))));
    }
}
