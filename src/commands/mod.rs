pub mod catalog;
pub mod detect;
pub mod prefs;
pub mod questionnaire;
pub mod scan;
pub mod uninstall;
pub mod whitelist;

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 查看已知进程目录
    Catalog(catalog::CatalogCommand),

    /// 提交使用习惯问卷并应用自动停止偏好
    Questionnaire(questionnaire::QuestionnaireCommand),

    /// 查看或修改进程偏好
    Prefs(prefs::PrefsCommand),

    /// 管理反检测白名单
    Whitelist(whitelist::WhitelistCommand),

    /// 对进程快照执行可疑进程检测
    Detect(detect::DetectCommand),

    /// 深度扫描最大文件与目录
    Scan(scan::ScanCommand),

    /// 卸载已安装的应用
    Uninstall(uninstall::UninstallCommand),
}
