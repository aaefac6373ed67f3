// src/locale.rs

//! Status and notification strings in the supported UI languages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// UI language stored in settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ja,
    Zh,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Language::Ja => "ja",
            Language::Zh => "zh",
        })
    }
}

impl FromStr for Language {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ja" => Ok(Language::Ja),
            "zh" => Ok(Language::Zh),
            other => Err(AppError::validation(format!("unsupported language '{other}'"))),
        }
    }
}

/// Catalog keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text {
    NotifyTitle,
    /// `{facilities}`, `{slots}`
    NotifyBody,
    /// `{count}`
    FoundStatus,
    NotFoundStatus,
    SyncDone,
    SyncFail,
    SearchStart,
    SearchFail,
    SyncStart,
    SyncError,
    /// `{reason}`
    InvalidCriteria,
    StepHome,
    StepFacility,
    StepCalendar,
    StepTimeSlot,
    StepLogin,
    PurposeSelectFailed,
    SearchActionMissing,
    NextActionMissing,
    LoginMissing,
    LoginFormMissing,
}

/// Looks up strings for one language.
#[derive(Debug, Clone, Copy, Default)]
pub struct Catalog {
    language: Language,
}

impl Catalog {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    pub fn text(&self, key: Text) -> &'static str {
        match self.language {
            Language::Ja => ja(key),
            Language::Zh => zh(key),
        }
    }

    /// Look up `key` and substitute `{name}` placeholders.
    pub fn format(&self, key: Text, args: &[(&str, String)]) -> String {
        args.iter()
            .fold(self.text(key).to_string(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
    }
}

fn ja(key: Text) -> &'static str {
    match key {
        Text::NotifyTitle => "🎉 空きが見つかりました！",
        Text::NotifyBody => "{facilities}施設で{slots}件の空きコマが見つかりました",
        Text::FoundStatus => "✓ {count}件の空きが見つかりました！",
        Text::NotFoundStatus => "検索完了 - 空きは見つかりませんでした",
        Text::SyncDone => "✓ パラメータ辞書を更新しました",
        Text::SyncFail => "⚠️ データが取得できませんでした。再試行してください。",
        Text::SearchStart => "🔄 検索開始: ページを開いています...",
        Text::SearchFail => "❌ 検索の開始に失敗しました",
        Text::SyncStart => "🔄 辞書同期: サイトを開いています...",
        Text::SyncError => "❌ 辞書同期に失敗しました",
        Text::InvalidCriteria => "❌ 検索条件が不正です: {reason}",
        Text::StepHome => "検索条件を設定中...",
        Text::StepFacility => "施設を選択中...",
        Text::StepCalendar => "空き状況を確認中...",
        Text::StepTimeSlot => "時間帯を確認中...",
        Text::StepLogin => "ログイン中...",
        Text::PurposeSelectFailed => "❌ 利用目的の選択に失敗しました",
        Text::SearchActionMissing => "❌ 検索ボタンが見つかりません",
        Text::NextActionMissing => "❌ 次へボタンが見つかりません",
        Text::LoginMissing => "ログイン情報が設定されていません。手動でログインしてください。",
        Text::LoginFormMissing => "ログイン画面を操作できません。手動でログインしてください。",
    }
}

fn zh(key: Text) -> &'static str {
    match key {
        Text::NotifyTitle => "🎉 找到空位了！",
        Text::NotifyBody => "在 {facilities} 个场馆找到 {slots} 个空位",
        Text::FoundStatus => "✓ 找到 {count} 个空位！",
        Text::NotFoundStatus => "搜索完成 - 未找到空位",
        Text::SyncDone => "✓ 参数字典已更新",
        Text::SyncFail => "⚠️ 获取失败，请重试",
        Text::SearchStart => "🔄 搜索开始: 正在打开页面...",
        Text::SearchFail => "❌ 搜索启动失败",
        Text::SyncStart => "🔄 字典同步: 正在打开网站...",
        Text::SyncError => "❌ 字典同步失败",
        Text::InvalidCriteria => "❌ 搜索条件无效: {reason}",
        Text::StepHome => "正在设置搜索条件...",
        Text::StepFacility => "正在选择场馆...",
        Text::StepCalendar => "正在查看空位情况...",
        Text::StepTimeSlot => "正在查看时间段...",
        Text::StepLogin => "正在登录...",
        Text::PurposeSelectFailed => "❌ 选择使用目的失败",
        Text::SearchActionMissing => "❌ 未找到搜索按钮",
        Text::NextActionMissing => "❌ 未找到下一步按钮",
        Text::LoginMissing => "未设置登录信息，请手动登录。",
        Text::LoginFormMissing => "无法操作登录页面，请手动登录。",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_placeholders() {
        let catalog = Catalog::new(Language::Ja);
        let body = catalog.format(
            Text::NotifyBody,
            &[("facilities", "1".to_string()), ("slots", "3".to_string())],
        );
        assert_eq!(body, "1施設で3件の空きコマが見つかりました");
    }

    #[test]
    fn test_language_switch() {
        let catalog = Catalog::new(Language::Zh);
        assert_eq!(
            catalog.format(Text::FoundStatus, &[("count", "2".to_string())]),
            "✓ 找到 2 个空位！"
        );
    }

    #[test]
    fn test_parse_language() {
        assert_eq!("ZH".parse::<Language>().unwrap(), Language::Zh);
        assert!("en".parse::<Language>().is_err());
        assert_eq!(Language::default(), Language::Ja);
    }
}
