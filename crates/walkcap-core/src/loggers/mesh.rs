//! Mesh anchors as Wavefront OBJ snapshots

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::{Appended, LoggerOutput, MESH_DIR, StreamLogger};
use crate::error::{CaptureError, CaptureResult};
use crate::types::{MeshSample, SensorSample, StreamKind};

/// File name for a mesh id
///
/// Anything outside `[A-Za-z0-9_-]` becomes `-`; a short hash of the raw id keeps ids that
/// sanitize alike apart.
pub fn mesh_file_name(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let digest = format!("{:x}", Sha256::digest(id.as_bytes()));
    format!("mesh-{}-{}.obj", safe, &digest[..8])
}

pub(crate) fn render_obj(mesh: &MeshSample) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# mesh {}", mesh.id);
    for [x, y, z] in &mesh.vertices {
        let _ = writeln!(out, "v {} {} {}", x, y, z);
    }
    let normals = mesh
        .normals
        .as_ref()
        .filter(|n| n.len() == mesh.vertices.len());
    if let Some(normals) = normals {
        for [x, y, z] in normals {
            let _ = writeln!(out, "vn {} {} {}", x, y, z);
        }
    }
    for face in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [face[0] + 1, face[1] + 1, face[2] + 1];
        if normals.is_some() {
            let _ = writeln!(out, "f {a}//{a} {b}//{b} {c}//{c}");
        } else {
            let _ = writeln!(out, "f {a} {b} {c}");
        }
    }
    out
}

pub(crate) struct MeshLogger {
    dir: PathBuf,
}

impl MeshLogger {
    pub(crate) async fn open(dir: &Path) -> CaptureResult<Self> {
        let dir = dir.join(MESH_DIR);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CaptureError::logger_open("mesh", format!("{}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    async fn replace(&self, path: &Path, body: &str) -> std::io::Result<()> {
        let tmp = path.with_extension("obj.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await
    }
}

#[async_trait]
impl StreamLogger for MeshLogger {
    fn stream(&self) -> StreamKind {
        StreamKind::Mesh
    }

    async fn append(&mut self, sample: SensorSample) -> CaptureResult<Appended> {
        let SensorSample::Mesh(mesh) = sample else {
            return Ok(Appended::Skipped);
        };
        if mesh.indices.iter().any(|&i| i as usize >= mesh.vertices.len()) {
            warn!(mesh = %mesh.id, "dropping mesh with out-of-range indices");
            return Ok(Appended::Skipped);
        }

        let path = self.dir.join(mesh_file_name(&mesh.id));
        let body = render_obj(&mesh);
        if let Err(first) = self.replace(&path, &body).await {
            warn!(path = %path.display(), error = %first, "mesh write failed, retrying");
            self.replace(&path, &body)
                .await
                .map_err(|e| CaptureError::logger_write("mesh", e.to_string()))?;
        }
        Ok(Appended::Written)
    }

    async fn close(self: Box<Self>) -> CaptureResult<LoggerOutput> {
        Ok(LoggerOutput::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn triangle(id: &str, normals: bool) -> MeshSample {
        MeshSample {
            id: id.to_string(),
            timestamp: 0.0,
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            indices: vec![0, 1, 2],
            normals: normals.then(|| vec![[0.0, 0.0, 1.0]; 3]),
        }
    }

    #[test]
    fn test_mesh_file_name_sanitized() {
        let name = mesh_file_name("A1/b c");
        assert!(name.starts_with("mesh-A1-b-c-"), "{name}");
        assert!(name.ends_with(".obj"));
        assert_eq!(name, mesh_file_name("A1/b c"));
    }

    #[test]
    fn test_mesh_file_names_do_not_collide() {
        assert_ne!(mesh_file_name("a/b"), mesh_file_name("a_b"));
        assert_ne!(mesh_file_name("a/b"), mesh_file_name("a-b"));
        assert_ne!(mesh_file_name("a b"), mesh_file_name("a/b"));
    }

    #[test]
    fn test_obj_uses_one_based_indices() {
        let obj = render_obj(&triangle("m", false));
        assert!(obj.contains("v 1 0 0\n"));
        assert!(obj.ends_with("f 1 2 3\n"));

        let obj = render_obj(&triangle("m", true));
        assert!(obj.contains("vn 0 0 1\n"));
        assert!(obj.ends_with("f 1//1 2//2 3//3\n"));
    }

    #[tokio::test]
    async fn test_snapshot_replaces_previous() {
        let dir = TempDir::new().unwrap();
        let mut logger = MeshLogger::open(dir.path()).await.unwrap();
        logger.append(SensorSample::Mesh(triangle("a", false))).await.unwrap();
        let mut bigger = triangle("a", false);
        bigger.vertices.push([0.0, 0.0, 1.0]);
        bigger.indices.extend([0, 1, 3]);
        logger.append(SensorSample::Mesh(bigger)).await.unwrap();

        let body =
            std::fs::read_to_string(dir.path().join(MESH_DIR).join(mesh_file_name("a"))).unwrap();
        assert_eq!(body.lines().filter(|l| l.starts_with("f ")).count(), 2);
        let entries = std::fs::read_dir(dir.path().join(MESH_DIR)).unwrap().count();
        assert_eq!(entries, 1);
    }
}
