//! Feature table: what each part of an application stack adds to a job.
//!
//! Every feature maps to a fixed [`Contribution`]. A job's source paths,
//! hooks and mounts are the concatenation of its features' contributions
//! in table order, keeping the first occurrence of any repeated entry.

use crate::job::MountSpec;
use crate::settings::ContainerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Compose files and config directory of a semantic.works stack
    Stack,
    /// Virtuoso database, snapshotted before each run
    Triplestore,
    /// Authorization data
    Authorization,
    /// mu-search Elasticsearch data
    Search,
    /// File service uploads
    FileService,
    /// Rotated, compressed and encrypted HTTP logs
    HttpLogs,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::Stack,
        Feature::Triplestore,
        Feature::Authorization,
        Feature::Search,
        Feature::FileService,
        Feature::HttpLogs,
    ];

    pub fn contribution(self, job_name: &str, container: &ContainerConfig) -> Contribution {
        let data = container.data_root.display();
        let app = format!("{data}/{job_name}");
        let scripts = container.scripts_dir.display().to_string();

        match self {
            Feature::Stack => Contribution {
                source_paths: vec![format!("{app}/docker-compose*.yml"), format!("{app}/config")],
                mounts: vec![MountSpec::read_only(&app)],
                ..Default::default()
            },
            Feature::Triplestore => Contribution {
                source_paths: vec![format!("{app}/data/db")],
                before_hooks: vec![format!(
                    "{scripts}/virtuoso-backup.sh $(/usr/bin/docker ps \
                     --filter \"label=com.docker.compose.project={job_name}\" \
                     --filter \"label=com.docker.compose.service=triplestore\" \
                     --format \"{{{{.Names}}}}\")"
                )],
                after_hooks: vec![format!("find {app}/data/db/backups -type f -delete")],
                mounts: vec![
                    MountSpec::read_only(&scripts),
                    // writable so the after hook can clean up the snapshot
                    MountSpec::read_write(&format!("{app}/data/db/backups")),
                ],
            },
            Feature::Authorization => Contribution {
                source_paths: vec![format!("{app}/data/authorization")],
                ..Default::default()
            },
            Feature::Search => Contribution {
                source_paths: vec![format!("{app}/data/elasticsearch")],
                ..Default::default()
            },
            Feature::FileService => Contribution {
                source_paths: vec![format!("{app}/data/files")],
                ..Default::default()
            },
            Feature::HttpLogs => Contribution {
                source_paths: vec![
                    format!("{app}/data/compressed/*/*.tar.gz"),
                    format!("{app}/data/encrypted/*/*.gpg"),
                ],
                after_hooks: vec![
                    format!("find {app}/data/compressed -type f -name \"*.tar.gz\" -delete"),
                    format!("find {app}/data/encrypted -type f -name \"*.gpg\" -delete"),
                ],
                mounts: vec![
                    MountSpec::read_only(&scripts),
                    MountSpec::read_write(&format!("{app}/data/compressed")),
                    MountSpec::read_write(&format!("{app}/data/encrypted")),
                ],
                ..Default::default()
            },
        }
    }
}

/// Paths, hooks and mounts one feature adds to a job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contribution {
    pub source_paths: Vec<String>,
    pub before_hooks: Vec<String>,
    pub after_hooks: Vec<String>,
    pub mounts: Vec<MountSpec>,
}

impl Contribution {
    /// Append `other`, skipping entries already present.
    pub fn extend(&mut self, other: Contribution) {
        push_unique(&mut self.source_paths, other.source_paths);
        push_unique(&mut self.before_hooks, other.before_hooks);
        push_unique(&mut self.after_hooks, other.after_hooks);
        push_unique(&mut self.mounts, other.mounts);
    }
}

fn push_unique<T: PartialEq>(target: &mut Vec<T>, items: Vec<T>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Combine the contributions of `features` for one job.
///
/// Features are applied in table order regardless of the order given.
pub fn expand(features: &[Feature], job_name: &str, container: &ContainerConfig) -> Contribution {
    let mut combined = Contribution::default();
    for feature in Feature::ALL.iter().filter(|f| features.contains(f)) {
        combined.extend(feature.contribution(job_name, container));
    }
    combined
}
