use crate::cache::{CacheStore, Database, Index, StoreIndexes};
use crate::domain::entities::{Setting, SettingEvent};

#[derive(Debug, Default)]
pub struct SettingIndexes {
    by_key: Index<String>,
}

impl StoreIndexes for SettingIndexes {
    type Object = Setting;
    type Event = SettingEvent;

    const NAME: &'static str = "settings";

    fn index(&mut self, setting: &Setting) {
        self.by_key.insert(setting.key.clone(), setting.id);
    }

    fn unindex(&mut self, setting: &Setting) {
        self.by_key.remove(&setting.key, setting.id);
    }
}

pub type SettingStore<D> = CacheStore<SettingIndexes, D>;

impl<D: Database> CacheStore<SettingIndexes, D> {
    /// Setting stored under `key`. If several rows share a key the oldest
    /// one wins.
    pub fn get_by_key(&self, key: &str) -> Option<Setting> {
        self.read(|snapshot| {
            let id = snapshot.indexes().by_key.first(key)?;
            snapshot.get(id).cloned()
        })
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.get_by_key(key).map(|setting| setting.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, Store};
    use crate::infra::db::MemoryDatabase;

    #[tokio::test]
    async fn key_lookup_follows_updates() {
        let db = MemoryDatabase::new();
        let settings = SettingStore::new(db, "setting", "setting_event", CacheConfig::default());
        settings.init().await.unwrap();

        let mut setting = settings
            .create(Setting {
                id: 0,
                key: "quiz.time_limit".to_string(),
                value: "30".to_string(),
            })
            .await
            .unwrap();
        settings.sync().await.unwrap();
        assert_eq!(settings.value("quiz.time_limit").as_deref(), Some("30"));

        setting.key = "quiz.duration".to_string();
        settings.update(setting).await.unwrap();
        settings.sync().await.unwrap();

        assert_eq!(settings.get_by_key("quiz.time_limit"), None);
        assert_eq!(settings.value("quiz.duration").as_deref(), Some("30"));
    }
}
