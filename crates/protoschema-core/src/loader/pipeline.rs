//! Load orchestration with Rayon-based parallel reads.
//!
//! Files are read and parsed in parallel one breadth-first level at a
//! time. Everything order-sensitive (import resolution, ambiguity checks,
//! error collection) runs on the calling thread afterwards, so the result
//! and the error messages do not depend on scheduling.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::diagnostics::ErrorCollector;
use crate::errors::{SchemaError, SchemaResult};
use crate::loader::builtins::builtin;
use crate::loader::filesystem::{resolve_all, Root};
use crate::loader::imports::{ambiguous_import_message, check_package_path, ImportResolver, ImportTarget};
use crate::loader::linker::Linker;
use crate::loader::{clamp_workers, LoadOptions, ProtoParser};
use crate::models::{Location, ProtoFile};
use crate::schema::Schema;

type Job<'r> = (&'r Root, Location);

pub struct SchemaLoader<'p, P: ProtoParser> {
    parser: &'p P,
    options: LoadOptions,
}

impl<'p, P: ProtoParser> SchemaLoader<'p, P> {
    pub fn new(parser: &'p P) -> Self {
        Self {
            parser,
            options: LoadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> LoadOptions {
        self.options
    }

    fn parse_job(&self, job: &Job<'_>) -> SchemaResult<ProtoFile> {
        let (root, location) = job;
        let source = root.read(location)?;
        self.parser.parse(location, &source)
    }

    /// Read and parse `jobs`, preserving their order. The first failure in
    /// job order wins.
    fn parse_all(
        &self,
        pool: Option<&rayon::ThreadPool>,
        jobs: &[Job<'_>],
    ) -> SchemaResult<Vec<ProtoFile>> {
        if jobs.is_empty() {
            return Ok(vec![]);
        }
        let results: Vec<SchemaResult<ProtoFile>> = match pool {
            Some(pool) => pool.install(|| jobs.par_iter().map(|job| self.parse_job(job)).collect()),
            // Fallback to sequential
            None => jobs.iter().map(|job| self.parse_job(job)).collect(),
        };
        results.into_iter().collect()
    }

    /// Load every `.proto` file under `sources`, then resolve imports
    /// against the loaded set, the bundled files and `search`.
    pub fn load(&self, sources: &[Location], search: &[Location]) -> SchemaResult<Schema> {
        let start = Instant::now();
        let source_roots = resolve_all(sources)?;
        let search_roots = resolve_all(search)?;

        let mut source_jobs: Vec<Job<'_>> = Vec::new();
        for root in &source_roots {
            for location in root.proto_files()? {
                source_jobs.push((root, location));
            }
        }
        if source_jobs.is_empty() {
            return Err(SchemaError::NoSources);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(clamp_workers(self.options.workers))
            .build()
            .ok();
        let mut errors = ErrorCollector::new();
        let mut files: Vec<ProtoFile> = Vec::new();
        let mut loaded: BTreeMap<String, Location> = BTreeMap::new();

        for file in self.parse_all(pool.as_ref(), &source_jobs)? {
            if file.location.base.is_empty() {
                if let Err(message) = check_package_path(&file) {
                    errors.add_error(message);
                }
            }
            let path = file.import_path();
            if let Some(previous) = loaded.get(&path) {
                errors.add_error(format!(
                    "{path} is loaded from both {previous} and {}",
                    file.location
                ));
                continue;
            }
            loaded.insert(path, file.location.clone());
            files.push(file);
        }
        let source_count = files.len();

        let resolver = ImportResolver::new(&search_roots);
        let mut lenient: Vec<String> = Vec::new();
        let mut level: Vec<usize> = (0..files.len()).collect();
        let mut depth = 0usize;

        while !level.is_empty() {
            let loaded_paths: BTreeSet<String> = loaded.keys().cloned().collect();
            let mut queued: BTreeSet<String> = BTreeSet::new();
            let mut bundled: Vec<ProtoFile> = Vec::new();
            let mut jobs: Vec<Job<'_>> = Vec::new();

            for &index in &level {
                let file = &files[index];
                let imports: Vec<&String> = if depth == 0 || self.options.exhaustive {
                    file.all_imports().collect()
                } else {
                    file.public_imports.iter().collect()
                };
                for import in imports {
                    if queued.contains(import) {
                        continue;
                    }
                    match resolver.resolve(import, &loaded_paths) {
                        ImportTarget::Loaded => {}
                        ImportTarget::Builtin => {
                            if let Some(bundled_file) = builtin(import) {
                                queued.insert(import.clone());
                                bundled.push(bundled_file);
                            }
                        }
                        ImportTarget::Found { root, location } => {
                            debug!("resolved import {import} to {location}");
                            queued.insert(import.clone());
                            jobs.push((&search_roots[root], location));
                        }
                        ImportTarget::Ambiguous(paths) => {
                            errors.add_error(ambiguous_import_message(import, &paths, &file.location));
                        }
                        ImportTarget::Missing => {
                            errors.add_error(resolver.missing_message(import, file));
                        }
                    }
                }
            }

            let parsed = self.parse_all(pool.as_ref(), &jobs)?;
            let mut next = Vec::with_capacity(bundled.len() + parsed.len());
            for file in bundled.into_iter().chain(parsed) {
                let path = file.import_path();
                if !self.options.exhaustive {
                    lenient.push(path.clone());
                }
                loaded.insert(path, file.location.clone());
                next.push(files.len());
                files.push(file);
            }
            level = next;
            depth += 1;
        }

        errors.throw_if_errors(SchemaError::Resolution)?;

        let total = files.len();
        let schema = Linker::new(files).lenient(lenient).link()?;
        info!(
            "loaded {total} files ({source_count} sources) in {} ms",
            start.elapsed().as_millis()
        );
        Ok(schema)
    }
}
