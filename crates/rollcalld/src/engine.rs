use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use rollcall_core::enroll::{EnrollError, Enrollment};
use rollcall_core::report::DailyReport;
use rollcall_core::{
    AttendanceEngine, AttendanceEvent, Capture, LedgerError, Mode, Outcome, Profile, ProfileError,
    SystemClock,
};
use rollcall_face::HttpFaceService;
use rollcall_store::{SqliteLedger, SqliteProfiles};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] rollcall_store::StoreError),
    #[error("face service client error: {0}")]
    FaceClient(#[from] rollcall_face::ClientError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),
    #[error("enrollment failed: {0}")]
    Enroll(#[from] EnrollError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Process {
        capture: Capture,
        mode: Mode,
        reply: oneshot::Sender<Outcome>,
    },
    Report {
        reply: oneshot::Sender<Result<DailyReport, LedgerError>>,
    },
    History {
        identity_id: String,
        reply: oneshot::Sender<Result<Vec<AttendanceEvent>, LedgerError>>,
    },
    Enroll {
        identity_id: String,
        capture: Capture,
        reply: oneshot::Sender<Result<Enrollment, EnrollError>>,
    },
    RegisterProfile {
        profile: Profile,
        reply: oneshot::Sender<Result<(), ProfileError>>,
    },
}

/// Clone-safe handle to the engine thread.
///
/// Requests from every clone are served one at a time, in arrival order.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Resolve one capture: quality gate, match, session decision, append.
    pub async fn process(&self, capture: Capture, mode: Mode) -> Result<Outcome, EngineError> {
        self.call(|reply| EngineRequest::Process {
            capture,
            mode,
            reply,
        })
        .await
    }

    pub async fn report(&self) -> Result<DailyReport, EngineError> {
        Ok(self.call(|reply| EngineRequest::Report { reply }).await??)
    }

    pub async fn history(&self, identity_id: String) -> Result<Vec<AttendanceEvent>, EngineError> {
        Ok(self
            .call(|reply| EngineRequest::History { identity_id, reply })
            .await??)
    }

    pub async fn enroll(&self, identity_id: String, capture: Capture) -> Result<Enrollment, EngineError> {
        Ok(self
            .call(|reply| EngineRequest::Enroll {
                identity_id,
                capture,
                reply,
            })
            .await??)
    }

    pub async fn register_profile(&self, profile: Profile) -> Result<(), EngineError> {
        Ok(self
            .call(|reply| EngineRequest::RegisterProfile { profile, reply })
            .await??)
    }
}

/// Open the SQLite store and face service client for `config`.
///
/// Must run on the engine thread: the blocking HTTP client may not be
/// created or dropped inside the async runtime.
pub fn build_engine(config: &Config) -> Result<AttendanceEngine, EngineError> {
    let ledger = SqliteLedger::open(&config.db_path)?;
    let profiles = SqliteProfiles::open(&config.db_path)?;
    tracing::info!(path = %config.db_path.display(), "attendance database opened");

    let faces = HttpFaceService::new(&config.face_client_config())?;

    Ok(AttendanceEngine::new(
        Box::new(faces),
        Box::new(ledger),
        Box::new(profiles),
        Box::new(SystemClock),
        config.engine_settings(),
    ))
}

/// Spawn the engine on a dedicated OS thread.
///
/// `build` runs on that thread; its failure is returned here so startup
/// fails fast if the store or face service client is unusable.
pub fn spawn_engine<F>(build: F) -> Result<EngineHandle, EngineError>
where
    F: FnOnce() -> Result<AttendanceEngine, EngineError> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<(), EngineError>>(1);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            let engine = match build() {
                Ok(engine) => {
                    let _ = ready_tx.send(Ok(()));
                    engine
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };

            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                serve(&engine, req);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    ready_rx.recv().map_err(|_| EngineError::ChannelClosed)??;
    Ok(EngineHandle { tx })
}

fn serve(engine: &AttendanceEngine, req: EngineRequest) {
    match req {
        EngineRequest::Process {
            capture,
            mode,
            reply,
        } => {
            let outcome = engine.process(&capture, mode);
            let _ = reply.send(outcome);
        }
        EngineRequest::Report { reply } => {
            let _ = reply.send(engine.daily_report());
        }
        EngineRequest::History { identity_id, reply } => {
            let _ = reply.send(engine.identity_history(&identity_id));
        }
        EngineRequest::Enroll {
            identity_id,
            capture,
            reply,
        } => {
            let _ = reply.send(engine.enroll(&identity_id, &capture));
        }
        EngineRequest::RegisterProfile { profile, reply } => {
            let _ = reply.send(engine.register_profile(&profile));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rollcall_core::{
        Action, EngineSettings, ErrorClass, FaceMatch, FaceQuality, FaceService, FixedClock,
        MemoryLedger, MemoryProfiles, ServiceError,
    };

    struct OneFace;

    impl FaceService for OneFace {
        fn detect_faces(&self, _: &[u8]) -> Result<Vec<FaceQuality>, ServiceError> {
            Ok(vec![FaceQuality {
                occluded: false,
                sharpness: 70.0,
            }])
        }

        fn search_faces(&self, _: &[u8], _: &str, _: usize, _: f32) -> Result<Vec<FaceMatch>, ServiceError> {
            Ok(vec![FaceMatch {
                external_id: "EMP2025".into(),
                similarity: 97.0,
            }])
        }

        fn index_face(&self, _: &[u8], _: &str, external_id: &str) -> Result<String, ServiceError> {
            Ok(format!("face-{external_id}"))
        }
    }

    fn spawn_fake(ledger: MemoryLedger) -> EngineHandle {
        let clock = FixedClock::new(
            NaiveDate::from_ymd_opt(2026, 10, 16)
                .and_then(|d| d.and_hms_opt(9, 0, 0))
                .unwrap(),
        );
        spawn_engine(move || {
            Ok(AttendanceEngine::new(
                Box::new(OneFace),
                Box::new(ledger),
                Box::new(MemoryProfiles::new()),
                Box::new(clock),
                EngineSettings::default(),
            ))
        })
        .unwrap()
    }

    fn capture() -> Capture {
        Capture::new(vec![0xFF, 0xD8])
    }

    #[tokio::test]
    async fn test_process_through_handle() {
        let ledger = MemoryLedger::new();
        let handle = spawn_fake(ledger.clone());

        let outcome = handle.process(capture(), Mode::AutoInfer).await.unwrap();
        assert!(matches!(outcome, Outcome::LoginRecorded { .. }));
        assert_eq!(ledger.len(), 1);

        let report = handle.report().await.unwrap();
        assert_eq!(report.active_today, 1);
    }

    #[tokio::test]
    async fn test_concurrent_handles_are_serialized() {
        let ledger = MemoryLedger::new();
        let handle = spawn_fake(ledger.clone());
        let other = handle.clone();

        let (a, b) = tokio::join!(
            handle.process(capture(), Mode::AutoInfer),
            other.process(capture(), Mode::AutoInfer),
        );
        let mut actions: Vec<Action> = [a.unwrap(), b.unwrap()]
            .iter()
            .map(|o| match o {
                Outcome::LoginRecorded { .. } => Action::Login,
                Outcome::LogoutRecorded { .. } => Action::Logout,
                other => panic!("unexpected outcome {other:?}"),
            })
            .collect();
        actions.sort();
        assert_eq!(actions, vec![Action::Login, Action::Logout]);
    }

    #[tokio::test]
    async fn test_enroll_requires_profile() {
        let handle = spawn_fake(MemoryLedger::new());
        let err = handle.enroll("EMP2025".into(), capture()).await.unwrap_err();
        assert!(matches!(err, EngineError::Enroll(EnrollError::NotRegistered(_))));

        handle
            .register_profile(Profile {
                identity_id: "EMP2025".into(),
                name: "Asha Rao".into(),
                department: None,
            })
            .await
            .unwrap();
        let enrollment = handle.enroll("EMP2025".into(), capture()).await.unwrap();
        assert_eq!(enrollment.face_id, "face-EMP2025");
    }

    #[test]
    fn test_build_failure_reported_at_spawn() {
        let err = spawn_engine(|| Err(EngineError::ChannelClosed)).err().unwrap();
        assert!(matches!(err, EngineError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_real_stack_with_unreachable_service() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_tests(dir.path());
        config.face_service_url = "http://127.0.0.1:9".into();
        config.request_timeout_secs = 1;

        let handle = spawn_engine(move || build_engine(&config)).unwrap();
        let outcome = handle.process(capture(), Mode::AutoInfer).await.unwrap();
        assert_eq!(outcome.class(), ErrorClass::ServiceTransient);
        assert!(handle.report().await.unwrap().today.is_empty());
    }
}
