//! In-memory `tar.gz` packing for sources that do not ship archives

use crate::error::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::Path;
use tar::{Builder, Header};

/// Pack a directory tree into a gzip-compressed tarball
pub fn pack_directory(dir: &Path) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", dir)?;
    Ok(builder.into_inner()?.finish()?)
}

/// Pack `(relative path, contents)` pairs into a gzip-compressed tarball
pub fn pack_files(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    for (path, contents) in files {
        let mut header = Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
        builder.append_data(&mut header, path.trim_start_matches('/'), contents.as_slice())?;
    }

    Ok(builder.into_inner()?.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tar::Archive;

    fn entries(bytes: &[u8]) -> Vec<(String, String)> {
        let mut archive = Archive::new(GzDecoder::new(bytes));
        let mut out = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path().unwrap().to_string_lossy().to_string();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            out.push((path, body));
        }
        out.sort();
        out
    }

    #[test]
    fn test_pack_files() {
        let bytes = pack_files(&[
            ("deployment-manifest.yml".to_string(), b"id: x\n".to_vec()),
            ("/prompts/a.md".to_string(), b"# A".to_vec()),
        ])
        .unwrap();

        assert_eq!(
            entries(&bytes),
            vec![
                ("deployment-manifest.yml".to_string(), "id: x\n".to_string()),
                ("prompts/a.md".to_string(), "# A".to_string()),
            ]
        );
    }

    #[test]
    fn test_pack_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("nested")).unwrap();
        std::fs::write(temp.path().join("top.txt"), "top").unwrap();
        std::fs::write(temp.path().join("nested/inner.txt"), "inner").unwrap();

        let bytes = pack_directory(temp.path()).unwrap();
        let names: Vec<String> = entries(&bytes)
            .into_iter()
            .map(|(p, _)| p.trim_start_matches("./").to_string())
            .collect();
        assert_eq!(names, vec!["nested/inner.txt", "top.txt"]);
    }
}
