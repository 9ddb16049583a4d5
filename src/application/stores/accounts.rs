use crate::cache::{CacheStore, Database, Index, StoreIndexes};
use crate::domain::entities::{Account, AccountEvent, AccountRole, AccountRoleEvent};

#[derive(Debug, Default)]
pub struct AccountIndexes;

impl StoreIndexes for AccountIndexes {
    type Object = Account;
    type Event = AccountEvent;

    const NAME: &'static str = "accounts";

    fn index(&mut self, _account: &Account) {}

    fn unindex(&mut self, _account: &Account) {}
}

pub type AccountStore<D> = CacheStore<AccountIndexes, D>;

#[derive(Debug, Default)]
pub struct AccountRoleIndexes {
    by_account: Index<i64>,
}

impl StoreIndexes for AccountRoleIndexes {
    type Object = AccountRole;
    type Event = AccountRoleEvent;

    const NAME: &'static str = "account_roles";

    fn index(&mut self, grant: &AccountRole) {
        self.by_account.insert(grant.account_id, grant.id);
    }

    fn unindex(&mut self, grant: &AccountRole) {
        self.by_account.remove(&grant.account_id, grant.id);
    }
}

pub type AccountRoleStore<D> = CacheStore<AccountRoleIndexes, D>;

impl<D: Database> CacheStore<AccountRoleIndexes, D> {
    pub fn find_by_account(&self, account_id: i64) -> Vec<AccountRole> {
        self.read(|snapshot| snapshot.select(snapshot.indexes().by_account.get(&account_id)))
    }

    /// Role ids granted directly to `account_id`.
    pub fn role_ids(&self, account_id: i64) -> Vec<i64> {
        self.find_by_account(account_id)
            .into_iter()
            .map(|grant| grant.role_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, Store};
    use crate::infra::db::MemoryDatabase;

    #[tokio::test]
    async fn grants_are_grouped_by_account() {
        let db = MemoryDatabase::new();
        let grants = AccountRoleStore::new(
            db,
            "account_role",
            "account_role_event",
            CacheConfig::default(),
        );
        grants.init().await.unwrap();

        for (account_id, role_id) in [(1, 5), (1, 6), (2, 5)] {
            grants
                .create(AccountRole {
                    id: 0,
                    account_id,
                    role_id,
                })
                .await
                .unwrap();
        }
        grants.sync().await.unwrap();

        assert_eq!(grants.role_ids(1), vec![5, 6]);
        assert_eq!(grants.role_ids(2), vec![5]);
        assert!(grants.role_ids(3).is_empty());
    }
}
