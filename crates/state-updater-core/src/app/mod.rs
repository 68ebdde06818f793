//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせて state updater を実装します。
//!
//! # 主要コンポーネント
//! - **StateUpdater**: 呼び出し側の facade（add / drain / shutdown）
//! - **StateUpdaterThread**: 復元ワーカー（pending 適用 → restore → 昇格 → 待機）
//! - **HandoffQueues**: 呼び出し側と worker の間の同期キュー
//! - **ShutdownGate**: worker 終了の通知
//! - **StateUpdaterConfig / StateUpdaterStatus**: 設定と状態表示

mod config;
mod gate;
mod handoff;
mod state_updater;
mod status;
mod worker;

pub(crate) use self::handoff::lock;

// 主要な型を再エクスポート
pub use self::config::StateUpdaterConfig;
pub use self::handoff::Action;
pub use self::state_updater::StateUpdater;
pub use self::status::{StateUpdaterStatus, WorkerStatus};
