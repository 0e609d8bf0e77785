use crate::error::GameError;
use crate::state::{GameCode, Session};
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// 会话版本号，每次成功写入加一
pub type Version = u64;

/// 版本冲突后最多重试的次数
pub const COMMIT_RETRIES: usize = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("会话 {0} 不存在")]
    NotFound(GameCode),
    #[error("会话 {0} 已存在")]
    AlreadyExists(GameCode),
    #[error("版本冲突：期望 {expected}，实际 {actual}")]
    Conflict { expected: Version, actual: Version },
}

/// 带版本号的会话存储
///
/// 所有修改都必须通过 `write_if_version`：只有当存储中的版本仍是读取时的版本，
/// 写入才会成功。这样两个并发请求不会基于同一个旧快照各自通过“是否轮到我”的校验。
pub trait SessionStore: Send + Sync {
    fn create(&self, session: Session) -> Result<Version, StoreError>;

    fn read(&self, id: &GameCode) -> Option<(Session, Version)>;

    /// 成功时返回新版本号
    fn write_if_version(&self, id: &GameCode, session: Session, expected: Version) -> Result<Version, StoreError>;

    fn remove(&self, id: &GameCode) -> Option<Session>;
}

/// 读取 → 计算 → 条件写入；遇到版本冲突时重新读取并重试。
///
/// `f` 必须是纯函数（会话上的方法都是），被丢弃的计算结果不会留下任何副作用。
pub fn commit<S, T, F>(store: &S, id: &GameCode, mut f: F) -> Result<(Session, T), GameError>
where
    S: SessionStore + ?Sized,
    F: FnMut(&Session) -> Result<(Session, T), GameError>,
{
    for attempt in 1..=COMMIT_RETRIES {
        let (current, version) = store.read(id).ok_or_else(|| GameError::SessionNotFound(id.clone()))?;
        let (next, value) = f(&current)?;
        match store.write_if_version(id, next.clone(), version) {
            Ok(_) => return Ok((next, value)),
            Err(StoreError::Conflict { expected, actual }) => {
                warn!(session = %id, attempt, expected, actual, "version conflict, retrying");
            }
            // 读取之后会话被删除
            Err(_) => return Err(GameError::SessionNotFound(id.clone())),
        }
    }
    Err(GameError::VersionConflict)
}

/// 内存实现，服务端和测试使用
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<GameCode, (Session, Version)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn create(&self, session: Session) -> Result<Version, StoreError> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&session.id) {
            return Err(StoreError::AlreadyExists(session.id));
        }
        sessions.insert(session.id.clone(), (session, 0));
        Ok(0)
    }

    fn read(&self, id: &GameCode) -> Option<(Session, Version)> {
        self.sessions.lock().get(id).cloned()
    }

    fn write_if_version(&self, id: &GameCode, session: Session, expected: Version) -> Result<Version, StoreError> {
        let mut sessions = self.sessions.lock();
        let (stored, version) = sessions.get_mut(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if *version != expected {
            return Err(StoreError::Conflict { expected, actual: *version });
        }
        *stored = session;
        *version += 1;
        Ok(*version)
    }

    fn remove(&self, id: &GameCode) -> Option<Session> {
        self.sessions.lock().remove(id).map(|(session, _)| session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Action, PlayerId};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;
    use std::thread;
    use uuid::Uuid;

    fn pid(n: u128) -> PlayerId {
        Uuid::from_u128(n)
    }

    fn seeded_store() -> (MemoryStore, GameCode) {
        let code: GameCode = "ROOM".parse().unwrap();
        let session = Session::new(code.clone(), pid(1), "P1".into())
            .join(pid(2), "P2".into())
            .unwrap()
            .start_round(&mut StdRng::seed_from_u64(1))
            .unwrap();
        let store = MemoryStore::new();
        store.create(session).unwrap();
        (store, code)
    }

    #[test]
    fn test_stale_write_is_rejected() {
        let (store, code) = seeded_store();
        let (session, v0) = store.read(&code).unwrap();
        let v1 = store.write_if_version(&code, session.clone(), v0).unwrap();
        assert_eq!(v1, v0 + 1);
        assert_eq!(
            store.write_if_version(&code, session, v0),
            Err(StoreError::Conflict { expected: v0, actual: v1 })
        );
    }

    #[test]
    fn test_create_twice_fails() {
        let (store, code) = seeded_store();
        let (session, _) = store.read(&code).unwrap();
        assert_eq!(store.create(session), Err(StoreError::AlreadyExists(code)));
    }

    #[test]
    fn test_commit_applies_action_and_bumps_version() {
        let (store, code) = seeded_store();
        let (next, _) = commit(&store, &code, |s| s.apply_action(pid(1), Action::Raise(3), 0)).unwrap();
        let (stored, version) = store.read(&code).unwrap();
        assert_eq!(stored, next);
        assert_eq!(version, 1);
        assert_eq!(stored.current_confidence, 3);
    }

    #[test]
    fn test_commit_rejection_leaves_store_untouched() {
        let (store, code) = seeded_store();
        let err = commit(&store, &code, |s| s.apply_action(pid(2), Action::Call, 0)).unwrap_err();
        assert!(matches!(err, GameError::InvalidActor { .. }));
        assert_eq!(store.read(&code).unwrap().1, 0);
    }

    #[test]
    fn test_commit_retries_after_conflict() {
        let (store, code) = seeded_store();
        let mut calls = 0;
        let (next, _) = commit(&store, &code, |s| {
            calls += 1;
            if calls == 1 {
                // 模拟另一个写者抢先提交
                let (current, v) = store.read(&code).unwrap();
                store.write_if_version(&code, current, v).unwrap();
            }
            s.apply_action(pid(1), Action::Call, 0)
        })
        .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(next.action_log.len(), 1);
        assert_eq!(store.read(&code).unwrap().1, 2);
    }

    #[test]
    fn test_missing_session() {
        let store = MemoryStore::new();
        let code: GameCode = "NONE".parse().unwrap();
        let err = commit(&store, &code, |s| Ok((s.clone(), ()))).unwrap_err();
        assert_eq!(err, GameError::SessionNotFound(code));
    }

    #[test]
    fn test_concurrent_submissions_only_one_wins() {
        // 两个线程同时以 P1 身份提交：只有一个能通过“是否轮到我”的校验
        let (store, code) = seeded_store();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..2)
            .map(|i| {
                let store = Arc::clone(&store);
                let code = code.clone();
                thread::spawn(move || commit(&*store, &code, |s| s.apply_action(pid(1), Action::Raise(2 + i), 0)))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let (stored, version) = store.read(&code).unwrap();
        assert_eq!(version, 1);
        assert_eq!(stored.action_log.len(), 1);
        assert_eq!(stored.current_actor, Some(pid(2)));
    }
}
