//! errors::messages
//!
//! Static user-facing messages per error tag: the symptom plus short
//! remediation steps. Shown verbatim by the error handler.

use super::ErrorTag;

/// The symptom line for a tag.
pub fn symptom(tag: ErrorTag) -> &'static str {
    match tag {
        ErrorTag::GitRepositoryCorruption => "Gitリポジトリが破損している可能性があります",
        ErrorTag::PermissionDenied => "ファイルまたはリソースへのアクセスが拒否されました",
        ErrorTag::DiskSpaceFull => "ディスクの空き容量がありません",
        ErrorTag::OutOfMemory => "メモリが不足しています",
        ErrorTag::AuthenticationFailed => "認証に失敗しました",
        ErrorTag::UnknownCritical => "重大なエラーが発生しました",
        ErrorTag::NetworkTimeout => "ネットワーク接続がタイムアウトしました",
        ErrorTag::ConnectionRefused => "サーバーへの接続が拒否されました",
        ErrorTag::MergeConflict => "マージコンフリクトが発生しました",
        ErrorTag::ApiRateLimit => "GitHub APIのレート制限に達しました",
        ErrorTag::FileNotFound => "必要なファイルが見つかりません",
        ErrorTag::ConfigurationMissing => "設定ファイルが見つかりません",
        ErrorTag::FileBusy => "ファイルが他のプロセスに使用されています",
        ErrorTag::UnknownRecoverable => "一時的なエラーが発生しました",
        ErrorTag::OptionalFeatureUnavailable => "オプション機能が利用できません",
        ErrorTag::ConfigurationMissingNonfatal => "設定が不完全です",
        ErrorTag::PerformanceWarning => "処理に時間がかかっています",
        ErrorTag::DeprecatedFeature => "非推奨の機能が使用されています",
        ErrorTag::Unknown => "予期しないエラーが発生しました",
    }
}

/// Remediation steps for a tag, in order.
pub fn remediation(tag: ErrorTag) -> &'static [&'static str] {
    match tag {
        ErrorTag::GitRepositoryCorruption => &[
            "git fsck を実行して破損箇所を確認してください",
            "バックアップからの復元を検討してください (tf help-flow)",
            "最終手段としてリポジトリを再クローンしてください",
        ],
        ErrorTag::PermissionDenied => &[
            "ファイルの所有者と権限を確認してください (ls -la)",
            "必要に応じて chmod / chown で権限を修正してください",
            "システムディレクトリへの書き込みは避けてください",
        ],
        ErrorTag::DiskSpaceFull => &[
            "df -h でディスク使用量を確認してください",
            "不要なファイルやビルド成果物を削除してください",
            "空き容量を確保してから再実行してください",
        ],
        ErrorTag::OutOfMemory => &[
            "他のアプリケーションを終了してメモリを解放してください",
            "処理対象を小さく分割して再実行してください",
        ],
        ErrorTag::AuthenticationFailed => &[
            "GITHUB_TOKENが正しく設定されているか確認してください",
            "https://github.com/settings/tokens でトークンを再発行してください",
            "トークンに repo スコープがあるか確認してください",
        ],
        ErrorTag::UnknownCritical => &[
            "ログファイル (.teamflow/logs/team-flow.log) を確認してください",
            "tf help-flow から復旧手順を実行してください",
        ],
        ErrorTag::NetworkTimeout => &[
            "ネットワーク接続を確認してください",
            "しばらく待ってから再実行してください",
        ],
        ErrorTag::ConnectionRefused => &[
            "ネットワーク接続とプロキシ設定を確認してください",
            "オフラインモードで作業を継続できます",
        ],
        ErrorTag::MergeConflict => &[
            "git status でコンフリクトしたファイルを確認してください",
            "各ファイルのコンフリクトマーカーを解消してください",
            "解消後に git add と git commit を実行してください",
            "作業を破棄する場合は tf help-flow から復元できます",
        ],
        ErrorTag::ApiRateLimit => &[
            "レート制限のリセットまで自動的に待機します",
            "頻繁に制限に達する場合は認証済みトークンを使用してください",
        ],
        ErrorTag::FileNotFound => &[
            "ファイルパスが正しいか確認してください",
            "デフォルト内容での自動作成を試みます",
        ],
        ErrorTag::ConfigurationMissing => &[
            "tf --setup で初期設定を実行してください",
            "tf --fix-config で設定の自動修復を試せます",
        ],
        ErrorTag::FileBusy => &[
            "ファイルを使用中のアプリケーションを閉じてください",
            "しばらく待ってから再実行してください",
        ],
        ErrorTag::UnknownRecoverable => &["しばらく待ってから再実行してください"],
        ErrorTag::OptionalFeatureUnavailable => &[
            "この機能を使うには追加の設定が必要です",
            "tf --check-config で設定状況を確認できます",
        ],
        ErrorTag::ConfigurationMissingNonfatal => &[
            "tf --check-config で不足している設定を確認してください",
        ],
        ErrorTag::PerformanceWarning => &["処理は継続中です。しばらくお待ちください"],
        ErrorTag::DeprecatedFeature => &["新しい設定方法への移行を検討してください"],
        ErrorTag::Unknown => &[
            "ログファイル (.teamflow/logs/team-flow.log) を確認してください",
            "再現する場合は詳細とあわせて報告してください",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tag_has_symptom_and_remediation() {
        for tag in ErrorTag::all() {
            assert!(!symptom(*tag).is_empty());
            let steps = remediation(*tag);
            assert!(!steps.is_empty());
            assert!(steps.len() <= 4);
        }
    }
}
