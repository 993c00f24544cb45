//! Image pull, load, inspect and cache lookup

use std::path::Path;

use super::{Engine, EngineClient, EngineError};
use crate::runner::RunResult;

/// Listing format that puts repository, tag and digest on one line
const IMAGE_LIST_FORMAT: &str = "{{.Repository}}:{{.Tag}}@{{.Digest}}";

const DOCKER_HUB_PREFIX: &str = "docker.io/";

/// The reference as the engine lists it
///
/// Docker drops the `docker.io/` registry from its listing.
fn listed_reference(engine: Engine, image: &str) -> &str {
    match engine {
        Engine::Docker => image.strip_prefix(DOCKER_HUB_PREFIX).unwrap_or(image),
        Engine::Podman => image,
    }
}

impl EngineClient {
    /// Pull an image, returning the engine's stdout
    pub async fn image_pull(&self, engine: Engine, image: &str) -> Result<Vec<u8>, EngineError> {
        let rr = self
            .run(engine, ["pull", "--quiet", image], &format!("pulling image {image}"))
            .await?;
        Ok(rr.stdout)
    }

    /// Whether `image` is in the engine's local image listing
    pub async fn image_in_cache(&self, engine: Engine, image: &str) -> Result<bool, EngineError> {
        let rr = self
            .run(engine, ["images", "--format", IMAGE_LIST_FORMAT], "listing images")
            .await?;
        let wanted = listed_reference(engine, image);
        Ok(rr.stdout_str().lines().any(|line| line.contains(wanted)))
    }

    /// Load an image from a tarball
    pub async fn image_load(&self, engine: Engine, tarball: &Path) -> Result<(), EngineError> {
        let path = tarball.to_string_lossy();
        self.run(
            engine,
            ["load", "-i", &*path],
            &format!("loading image from {path}"),
        )
        .await
        .map(|_| ())
    }

    pub async fn image_inspect(&self, engine: Engine, image: &str) -> Result<RunResult, EngineError> {
        self.run(engine, ["image", "inspect", image], &format!("inspecting image {image}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::StubEngine;

    const LISTING: &str = "printf 'gcr.io/k8s-minikube/kicbase:v0.0.44@sha256:abc\\nbusybox:latest@<none>\\n'";

    #[test]
    fn docker_listing_drops_hub_prefix() {
        assert_eq!(listed_reference(Engine::Docker, "docker.io/busybox:latest"), "busybox:latest");
        assert_eq!(
            listed_reference(Engine::Podman, "docker.io/busybox:latest"),
            "docker.io/busybox:latest"
        );
    }

    #[tokio::test]
    async fn cache_hit_and_miss() {
        let stub = StubEngine::new(Engine::Docker, LISTING);
        assert!(
            stub.client
                .image_in_cache(Engine::Docker, "docker.io/busybox:latest")
                .await
                .unwrap()
        );
        assert!(
            stub.client
                .image_in_cache(Engine::Docker, "gcr.io/k8s-minikube/kicbase:v0.0.44")
                .await
                .unwrap()
        );
        assert!(
            !stub
                .client
                .image_in_cache(Engine::Docker, "alpine:3.20")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn pull_is_quiet() {
        let stub = StubEngine::new(Engine::Podman, "echo sha256:deadbeef");
        let out = stub
            .client
            .image_pull(Engine::Podman, "busybox")
            .await
            .unwrap();
        assert_eq!(out, b"sha256:deadbeef\n");
        assert_eq!(stub.calls(), vec!["pull --quiet busybox"]);
    }
}
