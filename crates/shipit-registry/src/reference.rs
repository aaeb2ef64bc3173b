//! Image reference parsing.

/// Split an image reference into registry host and repository path.
///
/// # Examples
/// - `rg.example.com/app/api` -> `("rg.example.com", "app/api")`
/// - `localhost:5000/app` -> `("localhost:5000", "app")`
/// - `myuser/app` -> `("docker.io", "myuser/app")`
pub fn split_registry(image: &str) -> (String, String) {
    if let Some((first, rest)) = image.split_once('/') {
        // The first segment is a registry host when it contains a dot
        // (rg.example.com) or a port (localhost:5000).
        if first.contains('.') || first.contains(':') {
            return (first.to_string(), rest.to_string());
        }
    }
    ("docker.io".to_string(), image.to_string())
}

/// Registry host of an image reference or a host/namespace config value.
/// A bare host ("rg.example.com") is returned as-is.
pub fn registry_host(reference: &str) -> String {
    if !reference.contains('/') && (reference.contains('.') || reference.contains(':')) {
        return reference.to_string();
    }
    split_registry(reference).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_registry_with_namespace() {
        let (host, repo) = split_registry("rg.example.com/my-app/api");
        assert_eq!(host, "rg.example.com");
        assert_eq!(repo, "my-app/api");
    }

    #[test]
    fn test_split_registry_with_port() {
        let (host, repo) = split_registry("localhost:5000/api");
        assert_eq!(host, "localhost:5000");
        assert_eq!(repo, "api");
    }

    #[test]
    fn test_split_registry_docker_hub_fallback() {
        let (host, repo) = split_registry("myuser/app");
        assert_eq!(host, "docker.io");
        assert_eq!(repo, "myuser/app");
    }

    #[test]
    fn test_registry_host_of_config_value() {
        assert_eq!(registry_host("rg.example.com/my-app"), "rg.example.com");
    }

    #[test]
    fn test_registry_host_of_bare_host() {
        assert_eq!(registry_host("rg.example.com"), "rg.example.com");
        assert_eq!(registry_host("localhost:5000"), "localhost:5000");
    }
}
