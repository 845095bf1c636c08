//! Persistence seam for the chunk loop.
//!
//! The processor only needs the per-chunk cache and a way to save the project
//! aggregate; the SQLite store implements this, unit tests use an in-memory map.

use serde_json::Value;

use crate::state::ProjectState;

pub trait AnalysisRepository: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Cached oracle result of one chunk, verbatim.
    fn cached_result(&self, project_id: i64, chunk_index: u64)
    -> Result<Option<Value>, Self::Error>;

    /// Stores a result; an existing entry for the same chunk is left as is.
    fn store_result(
        &self,
        project_id: i64,
        chunk_index: u64,
        chunk_content: &str,
        result: &Value,
    ) -> Result<(), Self::Error>;

    /// Cached results with `chunk_index < below`, ordered by index.
    fn cached_results(&self, project_id: i64, below: u64) -> Result<Vec<(u64, Value)>, Self::Error>;

    fn save_project(&self, project_id: i64, state: &ProjectState) -> Result<(), Self::Error>;
}

impl<T: AnalysisRepository> AnalysisRepository for &T {
    type Error = T::Error;

    fn cached_result(&self, project_id: i64, chunk_index: u64) -> Result<Option<Value>, T::Error> {
        (**self).cached_result(project_id, chunk_index)
    }

    fn store_result(
        &self,
        project_id: i64,
        chunk_index: u64,
        chunk_content: &str,
        result: &Value,
    ) -> Result<(), T::Error> {
        (**self).store_result(project_id, chunk_index, chunk_content, result)
    }

    fn cached_results(&self, project_id: i64, below: u64) -> Result<Vec<(u64, Value)>, T::Error> {
        (**self).cached_results(project_id, below)
    }

    fn save_project(&self, project_id: i64, state: &ProjectState) -> Result<(), T::Error> {
        (**self).save_project(project_id, state)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        collections::{BTreeMap, HashMap},
        convert::Infallible,
        sync::Mutex,
    };

    use super::*;

    /// In-process repository.
    #[derive(Debug, Default)]
    pub struct MemoryRepository {
        cache: Mutex<BTreeMap<(i64, u64), (String, Value)>>,
        projects: Mutex<HashMap<i64, ProjectState>>,
    }

    impl MemoryRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn project(&self, project_id: i64) -> Option<ProjectState> {
            self.projects
                .lock()
                .ok()
                .and_then(|p| p.get(&project_id).cloned())
        }

        pub fn cached_count(&self, project_id: i64) -> usize {
            self.cache
                .lock()
                .map(|c| c.keys().filter(|(p, _)| *p == project_id).count())
                .unwrap_or(0)
        }
    }

    impl AnalysisRepository for MemoryRepository {
        type Error = Infallible;

        fn cached_result(&self, project_id: i64, chunk_index: u64) -> Result<Option<Value>, Infallible> {
            let cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
            Ok(cache.get(&(project_id, chunk_index)).map(|(_, v)| v.clone()))
        }

        fn store_result(
            &self,
            project_id: i64,
            chunk_index: u64,
            chunk_content: &str,
            result: &Value,
        ) -> Result<(), Infallible> {
            let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
            cache
                .entry((project_id, chunk_index))
                .or_insert_with(|| (chunk_content.to_string(), result.clone()));
            Ok(())
        }

        fn cached_results(&self, project_id: i64, below: u64) -> Result<Vec<(u64, Value)>, Infallible> {
            let cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
            Ok(cache
                .range((project_id, 0)..(project_id, below))
                .map(|((_, idx), (_, v))| (*idx, v.clone()))
                .collect())
        }

        fn save_project(&self, project_id: i64, state: &ProjectState) -> Result<(), Infallible> {
            let mut projects = self.projects.lock().unwrap_or_else(|p| p.into_inner());
            projects.insert(project_id, state.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryRepository;
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_is_write_once_and_ordered() {
        let repo = MemoryRepository::new();
        repo.store_result(1, 2, "c", &json!({ "a": 2 })).unwrap();
        repo.store_result(1, 0, "a", &json!({ "a": 0 })).unwrap();
        repo.store_result(1, 0, "a", &json!({ "a": "again" })).unwrap();
        repo.store_result(2, 1, "x", &json!({})).unwrap();

        let got = repo.cached_results(1, 3).unwrap();
        assert_eq!(got, vec![(0, json!({ "a": 0 })), (2, json!({ "a": 2 }))]);
        assert_eq!(repo.cached_results(1, 1).unwrap().len(), 1);
        assert_eq!(repo.cached_count(2), 1);
    }
}
