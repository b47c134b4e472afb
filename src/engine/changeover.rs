// ==========================================
// 产线排产系统 - 换型成本模型
// ==========================================
// 职责: 计算产线从一个品类切换到另一个品类的换型耗时
// 输入: 换型规则快照（批次开始时一次性加载）
// 输出: 换型分钟数,查询永不失败,缺失规则退回默认值
// ==========================================

use std::collections::HashMap;

use crate::domain::changeover::ChangeoverRule;

/// 换型规则完全缺失时的兜底分钟数
pub const DEFAULT_CHANGEOVER_MINUTES: i64 = 30;

// ==========================================
// ChangeoverMatrix - 换型成本矩阵
// ==========================================
// 红线: 只读快照,批次运行期间不刷新
pub struct ChangeoverMatrix {
    /// 产线专属规则: (from, to, line_id) -> 总换型分钟
    line_specific: HashMap<(String, String, String), i64>,
    /// 通用规则: (from, to) -> 总换型分钟
    general: HashMap<(String, String), i64>,
}

impl ChangeoverMatrix {
    /// 空矩阵,所有查询走默认值
    pub fn empty() -> Self {
        Self {
            line_specific: HashMap::new(),
            general: HashMap::new(),
        }
    }

    /// 从规则列表构建矩阵
    ///
    /// 同一键位出现多条规则时保留最后一条,总耗时按
    /// 基础换型 + 清洗 + 换模 + 校准（各自开关生效时）累加。
    pub fn from_rules(rules: &[ChangeoverRule]) -> Self {
        let mut matrix = Self::empty();
        for rule in rules {
            let total = rule.total_minutes();
            match &rule.line_id {
                Some(line_id) => {
                    matrix.line_specific.insert(
                        (
                            rule.from_category.clone(),
                            rule.to_category.clone(),
                            line_id.clone(),
                        ),
                        total,
                    );
                }
                None => {
                    matrix.general.insert(
                        (rule.from_category.clone(), rule.to_category.clone()),
                        total,
                    );
                }
            }
        }
        matrix
    }

    /// 查询换型分钟数
    ///
    /// 查找顺序: 同品类 0 -> 产线专属规则 -> 通用规则 -> 默认值。
    /// 产线无在产品类（from = None）视为无需换型。
    ///
    /// # 参数
    /// - `from`: 产线当前品类
    /// - `to`: 目标品类
    /// - `line_id`: 产线ID（None 时跳过专属规则）
    pub fn minutes(&self, from: Option<&str>, to: &str, line_id: Option<&str>) -> i64 {
        let from = match from {
            Some(f) => f,
            None => return 0,
        };
        if from == to {
            return 0;
        }

        if let Some(line_id) = line_id {
            let key = (from.to_string(), to.to_string(), line_id.to_string());
            if let Some(&minutes) = self.line_specific.get(&key) {
                return minutes;
            }
        }

        let key = (from.to_string(), to.to_string());
        if let Some(&minutes) = self.general.get(&key) {
            return minutes;
        }

        tracing::debug!(
            from_category = %from,
            to_category = %to,
            "换型规则缺失,使用默认换型时间"
        );
        DEFAULT_CHANGEOVER_MINUTES
    }

    /// 已加载的规则条数
    pub fn rule_count(&self) -> usize {
        self.line_specific.len() + self.general.len()
    }
}
