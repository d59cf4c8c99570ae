//! LSP server for devreplay.
//!
//! Validates documents on open, change, and save, publishes one diagnostic
//! per finding, and turns diagnostics back into quick fixes. Also serves the
//! `devreplay.fix` and `devreplay.adjustSeverity` commands.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use eyre::Result;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tower_lsp::jsonrpc::Result as LspResult;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};

use crate::catalog::{self, CatalogStore, SeverityUpdate, CATALOG_FILE};
use crate::config::{self, SeverityCfg};
use crate::diagnostics;
use crate::documents::{Document, Documents};
use crate::error::LintError;
use crate::fix::{self, ADJUST_SEVERITY_COMMAND, FIX_COMMAND};
use crate::lint::LintInvoker;
use crate::matcher::LintTarget;
use crate::models::{Finding, Rule};
use crate::severity::{adjust, Directive};

/// Run the LSP server over stdio.
pub async fn run_stdio() -> Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}

pub struct Backend {
    client: Client,
    invoker: LintInvoker,
    state: Mutex<ServerState>,
}

#[derive(Default)]
struct ServerState {
    documents: Documents,
    /// First workspace folder seen at initialization.
    workspace_root: Option<PathBuf>,
    catalog_name: String,
    severity: SeverityCfg,
    /// Overrides set through `devreplay.adjustSeverity` that cannot be stored.
    session_overrides: HashMap<String, Directive>,
    /// Last diagnostics published per document.
    published: HashMap<Url, Vec<Diagnostic>>,
    /// Client resolves code actions lazily.
    lazy_resolve: bool,
}

impl ServerState {
    fn catalog_for(&self, path: &Path) -> PathBuf {
        catalog::discover(path, &self.catalog_name, self.workspace_root.as_deref())
    }

    /// Catalogs an `adjustSeverity` request may touch: the one governing
    /// `scope`, or else those of all open documents plus the workspace one.
    fn candidate_catalogs(&self, scope: Option<&Url>) -> Vec<PathBuf> {
        if let Some(path) = scope.and_then(|u| u.to_file_path().ok()) {
            return vec![self.catalog_for(&path)];
        }
        let mut out: Vec<PathBuf> = self
            .documents
            .uris()
            .iter()
            .filter_map(|uri| uri.to_file_path().ok())
            .map(|path| self.catalog_for(&path))
            .collect();
        if let Some(root) = &self.workspace_root {
            out.push(root.join(&self.catalog_name));
        }
        out.sort();
        out.dedup();
        out
    }

    fn directive_for(&self, rule: &Rule) -> Option<Directive> {
        rule.ids()
            .into_iter()
            .find_map(|id| self.session_overrides.get(id).copied())
            .or_else(|| self.severity.directive_for(rule))
    }
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Backend::with_invoker(client, LintInvoker::default())
    }

    pub fn with_invoker(client: Client, invoker: LintInvoker) -> Self {
        Backend {
            client,
            invoker,
            state: Mutex::new(ServerState {
                catalog_name: CATALOG_FILE.to_string(),
                ..Default::default()
            }),
        }
    }

    async fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().await
    }

    /// Diagnostics most recently published for `uri`.
    pub async fn published(&self, uri: &Url) -> Vec<Diagnostic> {
        self.state().await.published.get(uri).cloned().unwrap_or_default()
    }

    /// Fresh lint of the document's current text.
    ///
    /// `None` when the document is unknown or not a file.
    async fn lint(&self, uri: &Url) -> Option<Result<(Document, Vec<Finding>), LintError>> {
        let path = uri.to_file_path().ok()?;
        let (doc, catalog) = {
            let state = self.state().await;
            let doc = state.documents.get(uri)?.clone();
            (doc, state.catalog_for(&path))
        };
        let invoker = self.invoker.clone();
        let text = doc.text.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let target = LintTarget {
                path: &path,
                text: Some(&text),
            };
            invoker.run(&target, &catalog)
        })
        .await;
        Some(match joined {
            Ok(Ok(findings)) => Ok((doc, findings)),
            Ok(Err(err)) => Err(err),
            Err(err) => Err(LintError::Task(err.to_string())),
        })
    }

    /// Lint and publish diagnostics for one document.
    ///
    /// Results of a pass that is no longer the newest for the document are
    /// dropped.
    async fn validate(&self, uri: Url) {
        let Some(pass) = self.state().await.documents.next_pass(&uri) else {
            return;
        };
        let findings = match self.lint(&uri).await {
            Some(Ok((_, findings))) => findings,
            Some(Err(err)) => {
                tracing::error!(%uri, %err, "lint failed");
                return;
            }
            None => return,
        };

        let (diags, version) = {
            let mut state = self.state().await;
            let Some(doc) = state.documents.get(&uri) else {
                return;
            };
            if doc.pass != pass {
                tracing::debug!(%uri, pass, latest = doc.pass, "dropping superseded lint pass");
                return;
            }
            let version = doc.version;
            let diags = diagnostics::map_with(&findings, Some(pass), |r| state.directive_for(r));
            state.published.insert(uri.clone(), diags.clone());
            (diags, version)
        };
        tracing::debug!(%uri, pass, count = diags.len(), "publishing diagnostics");
        self.client
            .publish_diagnostics(uri, diags, Some(version))
            .await;
    }

    async fn validate_all(&self) {
        let uris = self.state().await.documents.uris();
        for uri in uris {
            self.validate(uri).await;
        }
    }

    async fn fix_document(&self, uri: Url) {
        let (doc, findings) = match self.lint(&uri).await {
            Some(Ok(res)) => res,
            Some(Err(err)) => {
                tracing::error!(%uri, %err, "lint failed");
                return;
            }
            None => {
                tracing::warn!(%uri, "fix requested for unknown document");
                return;
            }
        };
        let Some(edit) = fix::fix_all(&uri, &doc, &findings) else {
            tracing::debug!(%uri, "nothing to fix");
            return;
        };
        match self.client.apply_edit(edit).await {
            Ok(resp) if !resp.applied => {
                tracing::warn!(%uri, reason = ?resp.failure_reason, "client rejected fix-all edit")
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(%uri, %err, "applyEdit request failed"),
        }
    }

    /// Apply `directive` to `rule_id` in the catalogs governing `scope`.
    ///
    /// Without a scope, every catalog of an open document plus the workspace
    /// catalog is tried. Concrete levels are written to each catalog holding
    /// the rule. `off` is kept for this session only, since it is not a
    /// storable severity.
    pub async fn adjust_severity(&self, rule_id: &str, directive: Directive, scope: Option<&Url>) {
        let catalogs = self.state().await.candidate_catalogs(scope);
        let id = rule_id.to_string();
        let joined = tokio::task::spawn_blocking(move || {
            catalogs
                .into_iter()
                .map(|path| {
                    let store = CatalogStore::new(path);
                    let res = store.adjust_severity(&id, directive);
                    (store, res)
                })
                .collect::<Vec<_>>()
        })
        .await;
        let outcomes = match joined {
            Ok(outcomes) => outcomes,
            Err(err) => {
                tracing::error!(rule_id, %err, "severity task failed");
                return;
            }
        };

        let mut found = false;
        let mut off = false;
        for (store, res) in outcomes {
            match res {
                Ok(SeverityUpdate::NoSuchRule) => {}
                Ok(SeverityUpdate::Off) => {
                    found = true;
                    off = true;
                }
                Ok(SeverityUpdate::Stored(level)) => {
                    found = true;
                    tracing::info!(rule_id, path = %store.path().display(), %level, "stored severity");
                }
                Err(err) => {
                    found = true;
                    tracing::error!(rule_id, %err, "failed to persist severity");
                    self.client
                        .show_message(MessageType::ERROR, format!("devreplay: {}", err))
                        .await;
                }
            }
        }
        if !found {
            tracing::warn!(rule_id, "no catalog rule with this id");
            self.client
                .show_message(
                    MessageType::WARNING,
                    format!("devreplay: no rule with id {}", rule_id),
                )
                .await;
            return;
        }

        {
            let mut state = self.state().await;
            if off {
                state
                    .session_overrides
                    .insert(rule_id.to_string(), Directive::Off);
            } else {
                state.session_overrides.remove(rule_id);
            }
        }
        self.validate_all().await;
    }
}

fn string_arg(args: &[Value], i: usize) -> Option<&str> {
    args.get(i).and_then(Value::as_str)
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> LspResult<InitializeResult> {
        #[allow(deprecated)]
        let root_uri = params.root_uri.clone();
        let root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|f| f.uri.to_file_path().ok())
            .or_else(|| root_uri.and_then(|u| u.to_file_path().ok()));
        let lazy_resolve = params
            .capabilities
            .text_document
            .as_ref()
            .and_then(|t| t.code_action.as_ref())
            .and_then(|c| c.resolve_support.as_ref())
            .is_some();

        {
            let mut state = self.state().await;
            if let Some(root) = root.as_deref() {
                if let Some(cfg) = config::load_config(root) {
                    if let Some(name) = cfg.catalog {
                        state.catalog_name = name;
                    }
                    state.severity = cfg.severity;
                }
            }
            tracing::info!(root = ?root, lazy_resolve, "initialized");
            state.workspace_root = root;
            state.lazy_resolve = lazy_resolve;
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        save: Some(TextDocumentSyncSaveOptions::Supported(true)),
                        ..Default::default()
                    },
                )),
                code_action_provider: Some(CodeActionProviderCapability::Options(
                    CodeActionOptions {
                        code_action_kinds: Some(vec![CodeActionKind::QUICKFIX]),
                        resolve_provider: Some(true),
                        ..Default::default()
                    },
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![FIX_COMMAND.to_string(), ADJUST_SEVERITY_COMMAND.to_string()],
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "devreplay".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn shutdown(&self) -> LspResult<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        self.state()
            .await
            .documents
            .open(doc.uri.clone(), doc.text, doc.version);
        self.validate(doc.uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let known = self.state().await.documents.change(
            &uri,
            params.text_document.version,
            params.content_changes,
        );
        if known {
            self.validate(uri).await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.validate(params.text_document.uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        {
            let mut state = self.state().await;
            state.documents.close(&uri);
            state.published.remove(&uri);
        }
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn code_action(&self, params: CodeActionParams) -> LspResult<Option<CodeActionResponse>> {
        let uri = params.text_document.uri;
        let ours: Vec<Diagnostic> = params
            .context
            .diagnostics
            .into_iter()
            .filter(diagnostics::is_ours)
            .collect();
        if ours.is_empty() {
            return Ok(Some(vec![]));
        }
        let (doc, findings) = match self.lint(&uri).await {
            Some(Ok(res)) => res,
            Some(Err(err)) => {
                tracing::error!(%uri, %err, "lint failed");
                return Ok(Some(vec![]));
            }
            None => return Ok(Some(vec![])),
        };
        let lazy = self.state().await.lazy_resolve;
        let actions = fix::code_actions(&uri, &doc, &findings, &ours, lazy);
        Ok(Some(
            actions
                .into_iter()
                .map(CodeActionOrCommand::CodeAction)
                .collect(),
        ))
    }

    async fn code_action_resolve(&self, action: CodeAction) -> LspResult<CodeAction> {
        let Some(data) = action
            .data
            .clone()
            .and_then(|v| serde_json::from_value::<fix::ActionData>(v).ok())
        else {
            return Ok(action);
        };
        match self.lint(&data.uri).await {
            Some(Ok((doc, findings))) => Ok(fix::resolve_action(action, &doc, &findings)),
            Some(Err(err)) => {
                tracing::error!(uri = %data.uri, %err, "lint failed");
                Ok(action)
            }
            None => Ok(action),
        }
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> LspResult<Option<Value>> {
        let args = params.arguments;
        match params.command.as_str() {
            FIX_COMMAND => match string_arg(&args, 0).and_then(|s| Url::parse(s).ok()) {
                Some(uri) => self.fix_document(uri).await,
                None => tracing::warn!(?args, "{} expects a document URI", FIX_COMMAND),
            },
            ADJUST_SEVERITY_COMMAND => {
                let rule_id = string_arg(&args, 0);
                let directive = string_arg(&args, 1).map(str::parse::<Directive>);
                let scope = string_arg(&args, 2).and_then(|s| Url::parse(s).ok());
                match (rule_id, directive) {
                    (Some(id), Some(Ok(d))) => self.adjust_severity(id, d, scope.as_ref()).await,
                    (_, Some(Err(err))) => {
                        self.client
                            .show_message(MessageType::WARNING, err.to_string())
                            .await
                    }
                    _ => tracing::warn!(
                        ?args,
                        "{} expects [ruleId, directive, uri?]",
                        ADJUST_SEVERITY_COMMAND
                    ),
                }
            }
            other => tracing::warn!(command = other, "unknown command"),
        }
        Ok(None)
    }
}
