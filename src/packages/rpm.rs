// src/packages/rpm.rs

//! RPM package format parser

use std::io::Cursor;

use rpm::Package;
use tracing::debug;

use crate::error::{Error, Result};
use crate::packages::traits::{Dependency, DependencyType, PackageFile, PackageFormat};

/// RPM package parsed from fetched bytes
#[derive(Debug)]
pub struct RpmPackage {
    name: String,
    version: String,
    architecture: Option<String>,
    description: Option<String>,
    files: Vec<PackageFile>,
    dependencies: Vec<Dependency>,
    // Provenance information
    source_rpm: Option<String>,
    vendor: Option<String>,
    license: Option<String>,
}

impl RpmPackage {
    /// Extract file list from RPM package with detailed metadata
    fn extract_files(pkg: &Package) -> Vec<PackageFile> {
        let mut files = Vec::new();

        if let Ok(file_entries) = pkg.metadata.get_file_entries() {
            for entry in file_entries {
                let sha256 = entry.digest.as_ref().map(|d| format!("{}", d));

                files.push(PackageFile {
                    path: entry.path.to_string_lossy().to_string(),
                    size: entry.size as i64,
                    mode: entry.mode.raw_mode() as i32,
                    sha256,
                });
            }
        }

        files
    }

    /// Extract runtime dependencies from RPM package
    fn extract_dependencies(pkg: &Package) -> Vec<Dependency> {
        let mut deps = Vec::new();

        if let Ok(requires) = pkg.metadata.get_requires() {
            for req in requires {
                // Skip rpmlib dependencies and file paths
                if req.name.starts_with("rpmlib(") || req.name.starts_with('/') {
                    continue;
                }

                let version = if !req.version.is_empty() {
                    Some(req.version.to_string())
                } else {
                    None
                };

                deps.push(Dependency {
                    name: req.name.to_string(),
                    version,
                    dep_type: DependencyType::Runtime,
                });
            }
        }

        deps
    }

    /// Full version string including release and, when nonzero, epoch
    fn full_version(pkg: &Package) -> Result<String> {
        let version = pkg
            .metadata
            .get_version()
            .map_err(|e| Error::ParseError(format!("Failed to get package version: {}", e)))?;
        let release = pkg.metadata.get_release().ok();
        let epoch = pkg.metadata.get_epoch().ok().filter(|e| *e > 0);

        let mut full = String::new();
        if let Some(epoch) = epoch {
            full.push_str(&format!("{}:", epoch));
        }
        full.push_str(version);
        if let Some(release) = release {
            full.push('-');
            full.push_str(release);
        }
        Ok(full)
    }
}

impl PackageFormat for RpmPackage {
    fn parse_bytes(data: &[u8], origin: &str) -> Result<Self> {
        debug!("Parsing RPM package from {} ({} bytes)", origin, data.len());

        let mut cursor = Cursor::new(data);
        let pkg = Package::parse(&mut cursor).map_err(|e| Error::ArtifactCorrupt {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;

        let name = pkg
            .metadata
            .get_name()
            .map_err(|e| Error::ArtifactCorrupt {
                origin: origin.to_string(),
                reason: format!("missing package name: {}", e),
            })?
            .to_string();

        let version = Self::full_version(&pkg).map_err(|_| Error::ArtifactCorrupt {
            origin: origin.to_string(),
            reason: "missing package version".to_string(),
        })?;

        let architecture = pkg.metadata.get_arch().ok().map(|s| s.to_string());
        let description = pkg.metadata.get_description().ok().map(|s| s.to_string());

        // Provenance
        let source_rpm = pkg.metadata.get_source_rpm().ok().map(|s| s.to_string());
        let vendor = pkg.metadata.get_vendor().ok().map(|s| s.to_string());
        let license = pkg.metadata.get_license().ok().map(|s| s.to_string());

        let files = Self::extract_files(&pkg);
        let dependencies = Self::extract_dependencies(&pkg);

        debug!(
            "Parsed RPM: {} version {} ({} files, {} dependencies)",
            name,
            version,
            files.len(),
            dependencies.len()
        );

        Ok(Self {
            name,
            version,
            architecture,
            description,
            files,
            dependencies,
            source_rpm,
            vendor,
            license,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn architecture(&self) -> Option<&str> {
        self.architecture.as_deref()
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn files(&self) -> &[PackageFile] {
        &self.files
    }

    fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }
}

impl RpmPackage {
    /// Get source RPM name (for provenance tracking)
    pub fn source_rpm(&self) -> Option<&str> {
        self.source_rpm.as_deref()
    }

    /// Get vendor information
    pub fn vendor(&self) -> Option<&str> {
        self.vendor.as_deref()
    }

    /// Get license information
    pub fn license(&self) -> Option<&str> {
        self.license.as_deref()
    }
}

/// Build a minimal in-memory RPM for tests
#[cfg(test)]
pub(crate) fn build_test_rpm(name: &str, version: &str, release: &str) -> Vec<u8> {
    let pkg = rpm::PackageBuilder::new(name, version, "MIT", "x86_64", "test package")
        .release(release)
        .build()
        .unwrap();

    let mut bytes = Vec::new();
    pkg.write(&mut bytes).unwrap();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_garbage_is_artifact_corrupt() {
        let result = RpmPackage::parse_bytes(b"definitely not an rpm", "/tmp/x.rpm");
        match result {
            Err(Error::ArtifactCorrupt { origin, .. }) => assert_eq!(origin, "/tmp/x.rpm"),
            other => panic!("expected ArtifactCorrupt, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_parse_empty_is_artifact_corrupt() {
        let result = RpmPackage::parse_bytes(b"", "empty");
        assert!(matches!(result, Err(Error::ArtifactCorrupt { .. })));
    }

    #[test]
    fn test_build_and_parse_round_trip() {
        let bytes = build_test_rpm("quarry-test", "1.0.1", "2");
        let pkg = RpmPackage::parse_bytes(&bytes, "memory").unwrap();

        assert_eq!(pkg.name(), "quarry-test");
        assert_eq!(pkg.version(), "1.0.1-2");
        assert_eq!(pkg.architecture(), Some("x86_64"));
    }

    #[test]
    fn test_identity_from_parsed_package() {
        let bytes = build_test_rpm("quarry-test", "2.0", "1");
        let pkg = RpmPackage::parse_bytes(&bytes, "memory").unwrap();
        let identity = pkg.identity();

        assert_eq!(identity.name, "quarry-test");
        assert_eq!(identity.version, "2.0-1");
        assert_eq!(identity.architecture.as_deref(), Some("x86_64"));
        assert_eq!(identity.to_string(), "quarry-test-2.0-1.x86_64");
    }

    #[test]
    fn test_same_bytes_same_identity() {
        let bytes = build_test_rpm("quarry-test", "1.0", "1");
        let a = RpmPackage::parse_bytes(&bytes, "origin-a").unwrap();
        let b = RpmPackage::parse_bytes(&bytes, "origin-b").unwrap();
        assert_eq!(a.identity(), b.identity());
    }
}
