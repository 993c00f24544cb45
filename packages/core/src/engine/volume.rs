//! Named volumes for node containers

use super::network::non_empty_lines;
use super::{CREATED_BY_LABEL, Engine, EngineClient, EngineError, ErrorKind, PROFILE_LABEL, stderr};

impl EngineClient {
    /// Create a labelled volume for `profile`
    pub async fn volume_create(
        &self,
        engine: Engine,
        name: &str,
        profile: &str,
    ) -> Result<(), EngineError> {
        let args = [
            "volume".to_string(),
            "create".to_string(),
            "--label".to_string(),
            format!("{PROFILE_LABEL}={profile}"),
            "--label".to_string(),
            format!("{CREATED_BY_LABEL}=true"),
            name.to_string(),
        ];
        self.run_raw(engine, args).await.map(|_| ()).map_err(|e| {
            if stderr::out_of_space(&e) {
                EngineError::from(ErrorKind::InsufficientStorage).fail_fast()
            } else {
                EngineError::command(format!("creating volume {name}"), e)
            }
        })
    }

    /// Remove a volume and everything in it
    pub async fn volume_remove(&self, engine: Engine, name: &str) -> Result<(), EngineError> {
        self.run_raw(engine, ["volume", "rm", "--force", name])
            .await
            .map(|_| ())
            .map_err(|e| {
                if stderr::volume_missing(&e) {
                    EngineError::from(ErrorKind::VolumeNotFound)
                } else {
                    EngineError::command(format!("removing volume {name}"), e)
                }
            })
    }

    /// Names of volumes carrying `label`
    pub async fn volumes_by_label(&self, engine: Engine, label: &str) -> Result<Vec<String>, EngineError> {
        let rr = self
            .run(
                engine,
                [
                    "volume",
                    "ls",
                    "--filter",
                    &format!("label={label}"),
                    "--format",
                    "{{.Name}}",
                ],
                "volume ls",
            )
            .await?;
        Ok(non_empty_lines(&rr.stdout_str()))
    }

    /// Remove unused volumes carrying `label`
    pub async fn volume_prune_by_label(&self, engine: Engine, label: &str) -> Result<(), EngineError> {
        self.run(
            engine,
            ["volume", "prune", "-f", "--filter", &format!("label={label}")],
            "volume prune",
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::StubEngine;

    #[tokio::test]
    async fn create_labels_volume() {
        let stub = StubEngine::new(Engine::Docker, "echo kicup");
        stub.client
            .volume_create(Engine::Docker, "kicup", "kicup")
            .await
            .unwrap();
        assert_eq!(
            stub.calls(),
            vec!["volume create --label name.kicup.io=kicup --label created_by.kicup.io=true kicup"]
        );
    }

    #[tokio::test]
    async fn missing_volume_is_typed() {
        let stub = StubEngine::new(
            Engine::Docker,
            "echo 'Error response from daemon: get kicup: no such volume' >&2; exit 1",
        );
        let err = stub
            .client
            .volume_remove(Engine::Docker, "kicup")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::VolumeNotFound));
    }

    #[tokio::test]
    async fn full_disk_fails_fast() {
        let stub = StubEngine::new(
            Engine::Docker,
            "echo 'mkdir /var/lib/docker/volumes/x: no space left on device' >&2; exit 1",
        );
        let err = stub
            .client
            .volume_create(Engine::Docker, "kicup", "kicup")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InsufficientStorage));
        assert!(err.is_fail_fast());
    }

    #[tokio::test]
    async fn lists_by_label() {
        let stub = StubEngine::new(Engine::Docker, "printf 'kicup\\nkicup-m02\\n\\n'");
        let names = stub
            .client
            .volumes_by_label(Engine::Docker, "name.kicup.io=kicup")
            .await
            .unwrap();
        assert_eq!(names, vec!["kicup", "kicup-m02"]);
    }
}
