// ==========================================
// 产线排产系统 - 引擎层
// ==========================================
// 职责: 实现排产业务规则,不拼 SQL
// 红线: Engine 不拼 SQL, 写库一律走 repository 层
// ==========================================

pub mod batch;
pub mod candidate;
pub mod changeover;
pub mod conflict;
pub mod estimator;
pub mod mix_batch;
pub mod repositories;
pub mod scoring;
pub mod sequence;
pub mod urgent;
pub mod worker;

// 重导出核心引擎
pub use batch::{BatchScheduler, SchedulingResult};
pub use candidate::{CandidateRanker, LineCandidate};
pub use changeover::ChangeoverMatrix;
pub use conflict::{ConflictDetector, ConflictResolver};
pub use estimator::{DurationEstimate, DurationEstimator};
pub use mix_batch::{MixBatchAnalyzer, MixBatchGroup};
pub use repositories::SchedulerRepositories;
pub use scoring::{ScoreBreakdown, StrategyScorer};
pub use sequence::SequenceOptimizer;
pub use urgent::{UrgentInsertResult, UrgentInsertionEngine};
pub use worker::{TransferAdvisor, TransferSuggestion, WorkerAssigner};
