//! Image references of the form `name[:tag][@digest]`

use std::fmt;
use std::str::FromStr;

use crate::error::{DockerError, Result};

const DEFAULT_DOMAIN: &str = "docker.io";
const LATEST: &str = "latest";
const RANDOM_LENGTH: usize = 10;

/// Reference to an image: repository name, optional tag and optional digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    name: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    /// Parse a reference such as `ubuntu`, `ubuntu:22.04` or `registry:5000/app@sha256:...`
    pub fn of(value: &str) -> Result<Self> {
        if value.is_empty() {
            return Err(DockerError::invalid_argument("Image reference must not be empty"));
        }
        let (remainder, digest) = match value.split_once('@') {
            Some((remainder, digest)) => (remainder, Some(digest)),
            None => (value, None),
        };
        let last_slash = remainder.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match remainder[last_slash..].rfind(':') {
            Some(i) => (
                &remainder[..last_slash + i],
                Some(&remainder[last_slash + i + 1..]),
            ),
            None => (remainder, None),
        };
        Self::new(name, tag, digest)
    }

    /// Build a reference from its parts, validating each one
    pub fn new(name: &str, tag: Option<&str>, digest: Option<&str>) -> Result<Self> {
        validate_name(name)?;
        if let Some(tag) = tag {
            validate_tag(tag)?;
        }
        if let Some(digest) = digest {
            validate_digest(digest)?;
        }
        Ok(Self {
            name: name.to_string(),
            tag: tag.map(str::to_string),
            digest: digest.map(str::to_string),
        })
    }

    /// A reference with a random lowercase suffix, used for short lived build images
    pub fn random(prefix: &str) -> Result<Self> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self::of(&format!("{}{}", prefix, &suffix[..RANDOM_LENGTH]))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Registry domain; `docker.io` when the name does not start with one
    pub fn domain(&self) -> &str {
        match self.name.split_once('/') {
            Some((first, _)) if is_domain(first) => first,
            _ => DEFAULT_DOMAIN,
        }
    }

    /// The reference without tag or digest
    pub fn in_tagless_form(&self) -> Self {
        Self {
            name: self.name.clone(),
            tag: None,
            digest: None,
        }
    }

    /// The reference with `latest` as tag when neither a tag nor a digest is set
    pub fn in_tagged_form(&self) -> Self {
        if self.tag.is_some() || self.digest.is_some() {
            return self.clone();
        }
        Self {
            name: self.name.clone(),
            tag: Some(LATEST.to_string()),
            digest: None,
        }
    }

    pub fn with_tag(&self, tag: &str) -> Result<Self> {
        validate_tag(tag)?;
        Ok(Self {
            name: self.name.clone(),
            tag: Some(tag.to_string()),
            digest: self.digest.clone(),
        })
    }

    pub fn with_digest(&self, digest: &str) -> Result<Self> {
        validate_digest(digest)?;
        Ok(Self {
            name: self.name.clone(),
            tag: self.tag.clone(),
            digest: Some(digest.to_string()),
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl FromStr for ImageReference {
    type Err = DockerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::of(s)
    }
}

fn is_domain(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DockerError::invalid_argument("Image name must not be empty"));
    }
    let mut components = name.split('/').peekable();
    if let Some(first) = components.peek().copied() {
        if name.contains('/') && is_domain(first) {
            validate_domain(first, name)?;
            components.next();
        }
    }
    for component in components {
        if !is_path_component(component) {
            return Err(DockerError::invalid_argument(format!(
                "Unable to parse image reference \"{}\". Image reference must be in the form '[domainHost:port/][path/]name[:tag][@digest]', with 'path' and 'name' containing only [a-z0-9][.][_][-]",
                name
            )));
        }
    }
    Ok(())
}

fn validate_domain(domain: &str, name: &str) -> Result<()> {
    let (host, port) = match domain.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (domain, None),
    };
    let host_valid = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    let port_valid = port.is_none_or(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    if host_valid && port_valid {
        Ok(())
    } else {
        Err(DockerError::invalid_argument(format!(
            "Invalid registry domain '{}' in image reference \"{}\"",
            domain, name
        )))
    }
}

/// `[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*`
fn is_path_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    if bytes.is_empty() || !is_alnum(bytes[0]) || !is_alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if is_alnum(c) {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && !is_alnum(bytes[i]) {
            i += 1;
        }
        let separator = &component[start..i];
        let valid = separator == "."
            || separator == "_"
            || separator == "__"
            || separator.bytes().all(|b| b == b'-');
        if !valid {
            return false;
        }
    }
    true
}

fn is_alnum(c: u8) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

/// `[\w][\w.-]{0,127}`
fn validate_tag(tag: &str) -> Result<()> {
    let word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut chars = tag.chars();
    let valid = tag.len() <= 128
        && chars.next().is_some_and(word)
        && chars.all(|c| word(c) || c == '.' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(DockerError::invalid_argument(format!("Invalid image tag '{}'", tag)))
    }
}

/// `algorithm:hex` with at least 32 hex characters
fn validate_digest(digest: &str) -> Result<()> {
    let valid = match digest.split_once(':') {
        Some((algorithm, hex)) => {
            !algorithm.is_empty()
                && algorithm
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "+._-".contains(c))
                && hex.len() >= 32
                && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DockerError::invalid_argument(format!("Invalid image digest '{}'", digest)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:6e9f67fa63b0323e9a1e587fd71c561ba48a034504fb804fd26fd8800039835d";

    #[test]
    fn test_round_trip_preserves_input() {
        for value in [
            "ubuntu",
            "ubuntu:22.04",
            "library/ubuntu:latest",
            "docker.io/paketobuildpacks/builder:base",
            "localhost:5000/my-app",
            "localhost:5000/my-app:1.0.0",
            "registry.example.com/team/app_name.v2:build-17",
        ] {
            let reference = ImageReference::of(value).unwrap();
            assert_eq!(reference.to_string(), value);
        }
    }

    #[test]
    fn test_tagless_form_omits_tag_and_digest() {
        let reference = ImageReference::of("localhost:5000/my-app:1.0.0").unwrap();
        assert_eq!(reference.tag(), Some("1.0.0"));
        assert_eq!(reference.in_tagless_form().to_string(), "localhost:5000/my-app");

        let digested = ImageReference::of(&format!("ubuntu:22.04@{}", DIGEST)).unwrap();
        assert_eq!(digested.digest(), Some(DIGEST));
        assert_eq!(digested.to_string(), format!("ubuntu:22.04@{}", DIGEST));
        assert_eq!(digested.in_tagless_form().to_string(), "ubuntu");
    }

    #[test]
    fn test_port_is_not_mistaken_for_tag() {
        let reference = ImageReference::of("localhost:5000/my-app").unwrap();
        assert_eq!(reference.name(), "localhost:5000/my-app");
        assert_eq!(reference.tag(), None);
        assert_eq!(reference.domain(), "localhost:5000");
    }

    #[test]
    fn test_default_domain() {
        assert_eq!(ImageReference::of("ubuntu").unwrap().domain(), "docker.io");
        assert_eq!(ImageReference::of("paketo/builder").unwrap().domain(), "docker.io");
        assert_eq!(ImageReference::of("gcr.io/distroless/base").unwrap().domain(), "gcr.io");
    }

    #[test]
    fn test_tagged_form_defaults_to_latest() {
        let reference = ImageReference::of("ubuntu").unwrap();
        assert_eq!(reference.in_tagged_form().to_string(), "ubuntu:latest");
        let tagged = ImageReference::of("ubuntu:focal").unwrap();
        assert_eq!(tagged.in_tagged_form(), tagged);
    }

    #[test]
    fn test_invalid_references_are_rejected() {
        for value in ["", "Ubuntu", "ubuntu:", "ubuntu:-bad", "my--app_/x", "app@sha256:zz", "a//b"] {
            let result = ImageReference::of(value);
            assert!(
                matches!(result, Err(DockerError::InvalidArgument(_))),
                "expected {value:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_random_reference_uses_prefix() {
        let first = ImageReference::random("pack.local/builder/").unwrap();
        let second = ImageReference::random("pack.local/builder/").unwrap();
        assert!(first.to_string().starts_with("pack.local/builder/"));
        assert_eq!(first.name().len(), "pack.local/builder/".len() + RANDOM_LENGTH);
        assert_ne!(first, second);
    }

    #[test]
    fn test_with_tag_and_digest() {
        let reference = ImageReference::of("app").unwrap();
        assert_eq!(reference.with_tag("v1").unwrap().to_string(), "app:v1");
        assert_eq!(
            reference.with_digest(DIGEST).unwrap().to_string(),
            format!("app@{}", DIGEST)
        );
        assert!(reference.with_tag("").is_err());
    }
}
