//! HTML rendering of a table of contents for web help output.

use super::context::BuildTocContext;
use super::group::BuildGroupTocInfo;
use super::topic::{TopicId, TopicTree};

/// Options for rendering a TOC tree
#[derive(Debug, Clone)]
pub struct TocHtmlOptions {
    /// Deepest level rendered; 0 renders everything
    pub maxdepth: usize,
    pub collapse: bool,
    /// Folder of the topic pages, relative to the TOC page
    pub html_folder: String,
    pub extension: String,
}

impl Default for TocHtmlOptions {
    fn default() -> Self {
        Self {
            maxdepth: 0,
            collapse: true,
            html_folder: "html".to_string(),
            extension: "htm".to_string(),
        }
    }
}

/// Render every group of the TOC context as one list
pub fn render_toc(context: &BuildTocContext, options: &TocHtmlOptions) -> String {
    let mut html = String::from("<ul class=\"toctree\">\n");
    for group in context.groups() {
        html.push_str(&render_topics(group.tree(), None, 1, options));
    }
    html.push_str("</ul>\n");
    html
}

/// Render one group as a list
pub fn render_group(group: &BuildGroupTocInfo, options: &TocHtmlOptions) -> String {
    if group.is_empty() {
        return String::new();
    }
    let mut html = String::from("<ul class=\"toctree\">\n");
    html.push_str(&render_topics(group.tree(), None, 1, options));
    html.push_str("</ul>\n");
    html
}

fn render_topics(tree: &TopicTree, at: Option<TopicId>, depth: usize, options: &TocHtmlOptions) -> String {
    tree.children(at)
        .iter()
        .map(|&id| render_topic(tree, id, depth, options))
        .collect()
}

fn render_topic(tree: &TopicTree, id: TopicId, depth: usize, options: &TocHtmlOptions) -> String {
    if depth > options.maxdepth && options.maxdepth > 0 {
        return String::new();
    }

    let info = tree.info(id);
    let href = if options.html_folder.is_empty() {
        format!("{}.{}", info.source(), options.extension)
    } else {
        format!("{}/{}.{}", options.html_folder, info.source(), options.extension)
    };
    let mut html = format!(
        "<li class=\"toctree-l{}\"><a class=\"reference internal\" href=\"{}\">{}</a>",
        depth,
        html_escape::encode_double_quoted_attribute(&href),
        html_escape::encode_text(info.name())
    );

    let children = tree.children(Some(id));
    if !children.is_empty() && (options.maxdepth == 0 || depth < options.maxdepth) {
        let collapsed = if options.collapse { " collapse" } else { "" };
        html.push_str(&format!("\n<ul class=\"toctree{}\">\n", collapsed));
        html.push_str(&render_topics(tree, Some(id), depth + 1, options));
        html.push_str("</ul>\n");
    }

    html.push_str("</li>\n");
    html
}
