//! 邮件模板渲染
//!
//! 每个模板包是 `templates_dir` 下的一个文件，按文件名寻址，
//! 内含三个具名区块：`subject`、`plainBody`、`htmlBody`。
//! 默认每次发送都重新加载模板文件；开启缓存后同名模板只解析一次，渲染结果不变。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use minijinja::{AutoEscape, Environment, ErrorKind};
use notify_shared::config::MailerConfig;
use tracing::debug;

use crate::error::NotificationError;

/// 模板字段集合，键为模板中引用的变量名
pub type TemplateFields = BTreeMap<String, String>;

/// 模板包必须提供的区块名称
pub mod blocks {
    pub const SUBJECT: &str = "subject";
    pub const PLAIN_BODY: &str = "plainBody";
    pub const HTML_BODY: &str = "htmlBody";
}

/// 渲染完成的邮件三部分
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMail {
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
}

/// 邮件模板渲染器
pub struct TemplateRenderer {
    dir: PathBuf,
    /// 仅在开启缓存时持有；minijinja 会缓存经 loader 加载过的模板
    cached: Option<Environment<'static>>,
}

impl TemplateRenderer {
    /// 每次渲染都从磁盘重新加载模板
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cached: None,
        }
    }

    /// 同名模板只加载一次
    pub fn with_cache(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let cached = Some(build_environment(&dir));
        Self { dir, cached }
    }

    pub fn from_config(config: &MailerConfig) -> Self {
        if config.cache_templates {
            Self::with_cache(&config.templates_dir)
        } else {
            Self::new(&config.templates_dir)
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 渲染指定模板的三个区块
    pub fn render(
        &self,
        template_name: &str,
        fields: &TemplateFields,
    ) -> Result<RenderedMail, NotificationError> {
        validate_name(template_name)?;

        match &self.cached {
            Some(env) => render_with(env, template_name, fields),
            None => {
                let env = build_environment(&self.dir);
                render_with(&env, template_name, fields)
            }
        }
    }
}

fn build_environment(dir: &Path) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_loader(minijinja::path_loader(dir.to_path_buf()));
    // 主题与纯文本正文不能被 HTML 转义；htmlBody 区块内显式使用 |escape
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env
}

/// 模板名只允许是目录下的单个文件名
fn validate_name(template_name: &str) -> Result<(), NotificationError> {
    let invalid = template_name.is_empty()
        || template_name.starts_with('.')
        || template_name.contains(['/', '\\'])
        || template_name.contains("..");

    if invalid {
        return Err(NotificationError::TemplateNotFound {
            template: template_name.to_string(),
        });
    }
    Ok(())
}

fn render_with(
    env: &Environment<'_>,
    template_name: &str,
    fields: &TemplateFields,
) -> Result<RenderedMail, NotificationError> {
    let render_error = |e: minijinja::Error| NotificationError::TemplateRender {
        template: template_name.to_string(),
        reason: e.to_string(),
    };

    let template = env.get_template(template_name).map_err(|e| {
        if e.kind() == ErrorKind::TemplateNotFound {
            NotificationError::TemplateNotFound {
                template: template_name.to_string(),
            }
        } else {
            render_error(e)
        }
    })?;

    let mut state = template.eval_to_state(fields).map_err(render_error)?;

    let subject = state.render_block(blocks::SUBJECT).map_err(render_error)?;
    let plain_body = state.render_block(blocks::PLAIN_BODY).map_err(render_error)?;
    let html_body = state.render_block(blocks::HTML_BODY).map_err(render_error)?;

    let rendered = RenderedMail {
        // 主题必须是单行
        subject: subject.trim().to_string(),
        plain_body: plain_body.trim().to_string(),
        html_body: html_body.trim().to_string(),
    };

    for (block, content) in [
        (blocks::SUBJECT, &rendered.subject),
        (blocks::PLAIN_BODY, &rendered.plain_body),
        (blocks::HTML_BODY, &rendered.html_body),
    ] {
        if content.is_empty() {
            return Err(NotificationError::TemplateRender {
                template: template_name.to_string(),
                reason: format!("区块 {block} 渲染结果为空"),
            });
        }
    }

    debug!(
        template = template_name,
        subject = %rendered.subject,
        "邮件模板渲染完成"
    );
    Ok(rendered)
}
