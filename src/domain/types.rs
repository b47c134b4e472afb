// ==========================================
// 产线排产系统 - 领域类型定义
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 订单状态 (Order Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,    // 待排产
    Scheduled,  // 已排产
    InProgress, // 生产中
    Completed,  // 已完成
    Cancelled,  // 已取消
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl OrderStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PENDING" => OrderStatus::Pending,
            "SCHEDULED" => OrderStatus::Scheduled,
            "IN_PROGRESS" => OrderStatus::InProgress,
            "COMPLETED" => OrderStatus::Completed,
            "CANCELLED" => OrderStatus::Cancelled,
            _ => OrderStatus::Pending, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Scheduled => "SCHEDULED",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

// ==========================================
// 物料到位状态 (Material Status)
// ==========================================
// 影响候选评分: 齐备 1.0 / 部分 0.5 / 等待 0.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaterialStatus {
    Ready,   // 齐备
    Partial, // 部分到位
    Waiting, // 等待到料
}

impl fmt::Display for MaterialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl MaterialStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "READY" => MaterialStatus::Ready,
            "PARTIAL" => MaterialStatus::Partial,
            "WAITING" => MaterialStatus::Waiting,
            _ => MaterialStatus::Waiting, // 未知按最保守处理
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            MaterialStatus::Ready => "READY",
            MaterialStatus::Partial => "PARTIAL",
            MaterialStatus::Waiting => "WAITING",
        }
    }
}

// ==========================================
// 产线状态 (Line Status)
// ==========================================
// 只有 AVAILABLE / RUNNING 参与排产
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineStatus {
    Available,   // 空闲可用
    Running,     // 生产中(可续排)
    Maintenance, // 检修
    Offline,     // 停用
}

impl fmt::Display for LineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl LineStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "AVAILABLE" => LineStatus::Available,
            "RUNNING" => LineStatus::Running,
            "MAINTENANCE" => LineStatus::Maintenance,
            "OFFLINE" => LineStatus::Offline,
            _ => LineStatus::Offline, // 未知状态不参与排产
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            LineStatus::Available => "AVAILABLE",
            LineStatus::Running => "RUNNING",
            LineStatus::Maintenance => "MAINTENANCE",
            LineStatus::Offline => "OFFLINE",
        }
    }

    /// 是否可以接收新排产任务
    pub fn is_schedulable(&self) -> bool {
        matches!(self, LineStatus::Available | LineStatus::Running)
    }
}

// ==========================================
// 任务状态 (Task Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Planned,   // 已计划(可被顺延/取消)
    Confirmed, // 已确认(不参与重排)
    Cancelled, // 已取消
    Completed, // 已完成
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl TaskStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PLANNED" => TaskStatus::Planned,
            "CONFIRMED" => TaskStatus::Confirmed,
            "CANCELLED" => TaskStatus::Cancelled,
            "COMPLETED" => TaskStatus::Completed,
            _ => TaskStatus::Planned, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            TaskStatus::Planned => "PLANNED",
            TaskStatus::Confirmed => "CONFIRMED",
            TaskStatus::Cancelled => "CANCELLED",
            TaskStatus::Completed => "COMPLETED",
        }
    }

    /// 是否占用产线时间(参与冲突检测与顺延)
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Planned | TaskStatus::Confirmed)
    }
}

// ==========================================
// 冲突类型 (Conflict Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    TimeOverlap, // 同线时间重叠
    Mold,        // 跨线模具争用
    TimeWindow,  // 交期窗口违反
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ConflictType {
    /// 从字符串解析冲突类型
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "TIME_OVERLAP" => Some(ConflictType::TimeOverlap),
            "MOLD" => Some(ConflictType::Mold),
            "TIME_WINDOW" => Some(ConflictType::TimeWindow),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ConflictType::TimeOverlap => "TIME_OVERLAP",
            ConflictType::Mold => "MOLD",
            ConflictType::TimeWindow => "TIME_WINDOW",
        }
    }
}

// ==========================================
// 冲突严重度 (Conflict Severity)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictSeverity {
    High,     // 高
    Critical, // 严重
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ConflictSeverity {
    /// 从字符串解析严重度
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "CRITICAL" => ConflictSeverity::Critical,
            _ => ConflictSeverity::High,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ConflictSeverity::High => "HIGH",
            ConflictSeverity::Critical => "CRITICAL",
        }
    }
}

// ==========================================
// 模具状态 (Mold Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoldStatus {
    Available,   // 可用
    InUse,       // 使用中
    Maintenance, // 维修
}

impl fmt::Display for MoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl MoldStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "AVAILABLE" => MoldStatus::Available,
            "IN_USE" => MoldStatus::InUse,
            "MAINTENANCE" => MoldStatus::Maintenance,
            _ => MoldStatus::Maintenance, // 未知状态不参与改派
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            MoldStatus::Available => "AVAILABLE",
            MoldStatus::InUse => "IN_USE",
            MoldStatus::Maintenance => "MAINTENANCE",
        }
    }
}

// ==========================================
// 工人状态 (Worker Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Available, // 在岗可分配
    Busy,      // 占用
    Off,       // 休班
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl WorkerStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "AVAILABLE" => WorkerStatus::Available,
            "BUSY" => WorkerStatus::Busy,
            "OFF" => WorkerStatus::Off,
            _ => WorkerStatus::Off, // 未知状态不参与分配
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            WorkerStatus::Available => "AVAILABLE",
            WorkerStatus::Busy => "BUSY",
            WorkerStatus::Off => "OFF",
        }
    }
}
