//! Line oriented edit scripts driving a [Session]
//!
//! ```text
//! # comments start with a hash
//! policy new
//! set name=web-out action=accept
//! interface src add
//! interface src set 0 port1
//! address dst add
//! address dst set 0 isdb:Google-Web
//! service add
//! service set 0 custom name=web8080 protocol=TCP port=8080
//! save office
//! template export office office.json
//! shorten http://localhost:5000/get_template/office
//! ```
use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::{debug, info};

use super::backend::TemplateBackend;
use super::catalog::CatalogStore;
use super::errors::EditorError;
use super::merger::Selection;
use super::parser::{tokenize_line, Token};
use super::policies::{CustomServiceField, Direction, Field, PolicyId, ServiceSelection};
use super::session::Session;
use super::wire::ExportedTemplate;

/// A tokenized script line: command word, positional arguments and `key=value` options
#[derive(Debug)]
struct Command<'a> {
    name: &'a str,
    args: Vec<&'a str>,
    options: Vec<(&'a str, &'a str)>,
}

impl<'a> Command<'a> {
    fn from_tokens(tokens: Vec<Token<'a>>) -> Result<Command<'a>> {
        let mut tokens = tokens.into_iter();

        let Some(Token::Key(name)) = tokens.next() else {
            bail!("a line must start with a command");
        };

        let mut cmd = Command {
            name,
            args: vec![],
            options: vec![],
        };

        for t in tokens {
            match t {
                Token::Key(k) => cmd.args.push(k),
                Token::KeyValue(k, v) => cmd.options.push((k, v)),
            }
        }

        Ok(cmd)
    }

    fn arg(&self, i: usize) -> Result<&'a str> {
        self.args
            .get(i)
            .copied()
            .ok_or_else(|| anyhow!("{}: missing argument #{}", self.name, i + 1))
    }

    fn index(&self, i: usize) -> Result<usize> {
        let a = self.arg(i)?;
        a.parse()
            .with_context(|| format!("{}: '{}' is not a position", self.name, a))
    }

    fn no_options(&self) -> Result<()> {
        match self.options.first() {
            Some((k, _)) => bail!("{}: unexpected option '{}'", self.name, k),
            None => Ok(()),
        }
    }
}

/// Resolves `#<index>` or a policy id; no argument means the selected policy
fn policy_ref(session: &Session, arg: Option<&str>) -> Result<PolicyId> {
    match arg {
        Some(a) => match a.strip_prefix('#') {
            Some(index) => {
                let index: usize = index
                    .parse()
                    .with_context(|| format!("'{}' is not a policy index", a))?;
                Ok(session.id_at(index)?.clone())
            }
            None => Ok(PolicyId::from(a)),
        },
        None => session
            .selected()
            .cloned()
            .ok_or_else(|| EditorError::NoBoundRecord.into()),
    }
}

async fn read_catalog(path: &Path) -> Result<CatalogStore> {
    let data = fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;

    if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&data).with_context(|| format!("decode {}", path.display()))
    } else {
        Ok(CatalogStore::from_device_config(&data))
    }
}

/// Runs edit scripts against a session. Relative file names resolve against `workspace`.
pub struct ScriptRunner<'a, B: TemplateBackend> {
    backend: &'a B,
    workspace: &'a Path,
}

impl<'a, B: TemplateBackend> ScriptRunner<'a, B> {
    pub fn new(backend: &'a B, workspace: &'a Path) -> Self {
        ScriptRunner { backend, workspace }
    }

    /// Runs every line of `text`; the first failing line aborts the script
    pub async fn run(&self, session: &mut Session, text: &str) -> Result<()> {
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            self.run_line(session, line)
                .await
                .with_context(|| format!("line {}: {}", n + 1, line))?;
        }

        Ok(())
    }

    pub async fn run_line(&self, session: &mut Session, line: &str) -> Result<()> {
        let cmd = Command::from_tokens(tokenize_line(line)?)?;

        debug!(target: "script", "{:?}", &cmd);

        match cmd.name {
            "policy" => self.policy(session, &cmd).await,
            "set" => {
                let id = policy_ref(session, None)?;
                for (k, v) in cmd.options.iter() {
                    session.apply_field_edit(&id, Field::from_str(k)?, v)?;
                }
                Ok(())
            }
            "form" => {
                for (k, v) in cmd.options.iter() {
                    session.form_edit(Field::from_str(k)?, v)?;
                }
                Ok(())
            }
            "commit" => Ok(session.commit()?),
            "reset" => Ok(session.reset_bound_record()?),
            "interface" => interface(session, &cmd),
            "address" => address(session, &cmd),
            "subject" => subject(session, &cmd),
            "service" => service(session, &cmd),
            "load" => {
                match cmd.args.first() {
                    Some(name) => session.load_template(self.backend, name).await?,
                    None => session.load_blank(self.backend).await?,
                }
                Ok(())
            }
            "save" => Ok(session.save_template(self.backend, cmd.arg(0)?).await?),
            "template" => self.template(session, &cmd).await,
            "shorten" => {
                cmd.no_options()?;
                let url = cmd.arg(0)?;
                let code = self
                    .backend
                    .shorten_url(url)
                    .await
                    .with_context(|| format!("shorten {}", url))?;
                info!("short code for {}: {}", url, code);
                Ok(())
            }
            "import-catalog" => {
                let path = self.workspace.join(cmd.arg(0)?);
                session.import_catalog(read_catalog(&path).await?);
                Ok(())
            }
            _ => bail!("unknown command '{}'", cmd.name),
        }
    }

    async fn policy(&self, session: &mut Session, cmd: &Command<'_>) -> Result<()> {
        cmd.no_options()?;

        match cmd.arg(0)? {
            "new" => {
                session.create();
            }
            "select" => {
                let id = policy_ref(session, Some(cmd.arg(1)?))?;
                session.select(&id)?;
            }
            "delete" => {
                let id = policy_ref(session, cmd.args.get(1).copied())?;
                session.delete(&id)?;
            }
            "clone" => {
                let id = policy_ref(session, cmd.args.get(1).copied())?;
                session.clone_policy(self.backend, &id).await?;
            }
            other => bail!("unknown policy operation '{}'", other),
        }

        Ok(())
    }

    /// Stored template management; only `import` takes an option, `name=` to store under
    async fn template(&self, session: &mut Session, cmd: &Command<'_>) -> Result<()> {
        if cmd.arg(0)? != "import" {
            cmd.no_options()?;
        }

        match cmd.arg(0)? {
            "list" => {
                let names = self.backend.list_templates().await.context("list templates")?;
                info!("{} stored templates", names.len());
                for name in names {
                    info!("  {}", name);
                }
            }
            "clone" => {
                let name = cmd.arg(1)?;
                let copy = self
                    .backend
                    .clone_template(name)
                    .await
                    .with_context(|| format!("clone template {}", name))?;
                info!("template {} cloned as {}", name, copy);
            }
            "rename" => session.rename_template(self.backend, cmd.arg(1)?, cmd.arg(2)?).await?,
            "delete" => session.delete_template(self.backend, cmd.arg(1)?).await?,
            "export" => {
                let name = cmd.arg(1)?;
                let path = self.workspace.join(cmd.arg(2)?);

                let exported = self
                    .backend
                    .export_template(name)
                    .await
                    .with_context(|| format!("export template {}", name))?;

                let data = serde_json::to_string_pretty(&exported)?;
                fs::write(&path, data)
                    .await
                    .with_context(|| format!("write {}", path.display()))?;

                info!("template {} exported to {}", name, path.display());
            }
            "import" => {
                let path = self.workspace.join(cmd.arg(1)?);

                let data = fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("read {}", path.display()))?;
                let mut exported: ExportedTemplate = serde_json::from_str(&data)
                    .with_context(|| format!("decode {}", path.display()))?;

                for (k, v) in cmd.options.iter() {
                    match *k {
                        "name" => exported.name = v.to_string(),
                        _ => bail!("{}: unexpected option '{}'", cmd.name, k),
                    }
                }

                let name = self
                    .backend
                    .import_template(exported)
                    .await
                    .with_context(|| format!("import {}", path.display()))?;
                info!("{} imported as template {}", path.display(), name);
            }
            other => bail!("unknown template operation '{}'", other),
        }

        Ok(())
    }
}

fn interface(session: &mut Session, cmd: &Command<'_>) -> Result<()> {
    cmd.no_options()?;
    let dir = Direction::from_str(cmd.arg(0)?)?;

    match cmd.arg(1)? {
        "add" => {
            session.add_interface(dir)?;
        }
        "set" => session.set_interface(dir, cmd.index(2)?, cmd.arg(3)?)?,
        "remove" => {
            session.remove_interface(dir, cmd.index(2)?)?;
        }
        other => bail!("unknown interface operation '{}'", other),
    }

    Ok(())
}

fn address(session: &mut Session, cmd: &Command<'_>) -> Result<()> {
    cmd.no_options()?;
    let dir = Direction::from_str(cmd.arg(0)?)?;

    match cmd.arg(1)? {
        "add" => {
            session.add_address(dir)?;
        }
        "set" => session.set_address(dir, cmd.index(2)?, Selection::from_str(cmd.arg(3)?)?)?,
        "remove" => {
            session.remove_address(dir, cmd.index(2)?)?;
        }
        other => bail!("unknown address operation '{}'", other),
    }

    Ok(())
}

fn subject(session: &mut Session, cmd: &Command<'_>) -> Result<()> {
    cmd.no_options()?;

    match cmd.arg(0)? {
        "add" => {
            session.add_subject()?;
        }
        "set" => session.set_subject(cmd.index(1)?, Selection::from_str(cmd.arg(2)?)?)?,
        "remove" => {
            session.remove_subject(cmd.index(1)?)?;
        }
        other => bail!("unknown subject operation '{}'", other),
    }

    Ok(())
}

fn service(session: &mut Session, cmd: &Command<'_>) -> Result<()> {
    match cmd.arg(0)? {
        "add" => {
            cmd.no_options()?;
            session.add_service()?;
        }
        "set" => {
            let index = cmd.index(1)?;
            session.set_service(index, ServiceSelection::from_str(cmd.arg(2)?)?)?;

            for (k, v) in cmd.options.iter() {
                session.update_custom_service(index, CustomServiceField::from_str(k)?, v)?;
            }
        }
        "update" => {
            let index = cmd.index(1)?;
            for (k, v) in cmd.options.iter() {
                session.update_custom_service(index, CustomServiceField::from_str(k)?, v)?;
            }
        }
        "remove" => {
            cmd.no_options()?;
            session.remove_service(cmd.index(1)?)?;
        }
        other => bail!("unknown service operation '{}'", other),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::ScriptRunner;
    use crate::editor::actions::{Action, NatMode, Protocol};
    use crate::editor::backend::TemplateBackend;
    use crate::editor::config_files::EditorConfig;
    use crate::editor::errors::EditorError;
    use crate::editor::policies::{Direction, PolicyId, ServiceSelection};
    use crate::editor::session::Session;
    use crate::editor::store::FileBackend;
    use crate::editor::testing::{blank_session, fixture_dir, two_policy_session, StubBackend};
    use assert2::check;
    use rstest::rstest;
    use std::path::Path;

    async fn run(session: &mut Session, backend: &StubBackend, text: &str) -> anyhow::Result<()> {
        ScriptRunner::new(backend, &fixture_dir())
            .run(session, text)
            .await
    }

    #[rstest]
    #[tokio::test]
    async fn test_build_policy(blank_session: Session) {
        let mut session = blank_session;
        let backend = StubBackend::default();

        let script = r#"
            # start from the device catalog
            load
            set name=web-out comment="staff web access" action=accept
            interface src add
            interface src set 0 port1
            interface dst add
            interface dst set 0 wan1
            address src add
            address src set 0 address:lan-net
            address src add
            address src set 1 address_group:office
            address dst add
            address dst set 0 isdb:Google-Web
            service add
            service set 0 custom name=web8080 protocol=TCP port=8080
            service add
            service set 1 "group:Web Access"
            subject add
            subject set 0 group:staff
            set nat=enable ip-pool=pool1
        "#;

        run(&mut session, &backend, script).await.unwrap();

        let r = session.selected_record().unwrap();
        check!(r.name == "web-out");
        check!(r.comment == "staff web access");
        check!(r.action == Action::Accept);
        check!(r.src_interfaces == vec!["port1"]);
        check!(r.dst_interfaces == vec!["wan1"]);
        check!(r.addresses(Direction::Src).addresses == vec!["lan-net"]);
        check!(r.addresses(Direction::Src).address_groups == vec!["office"]);
        check!(r.addresses(Direction::Dst).internet_services == vec!["Google-Web"]);
        check!(
            r.services
                == vec![
                    ServiceSelection::Custom {
                        name: "web8080".to_string(),
                        protocol: Protocol::TCP,
                        port: "8080".to_string(),
                    },
                    ServiceSelection::Group {
                        name: "Web Access".to_string()
                    },
                ]
        );
        check!(r.subjects.groups == vec!["staff"]);
        check!(r.nat == NatMode::Enable);
        check!(r.ip_pool == "pool1");

        // the form follows the record
        check!(session.form().surface().name == "web-out");
    }

    #[rstest]
    #[tokio::test]
    async fn test_policy_commands(two_policy_session: Session) {
        let mut session = two_policy_session;
        let backend = StubBackend::default();

        run(&mut session, &backend, "policy select #1").await.unwrap();
        check!(session.selected_record().unwrap().name == "second");

        run(&mut session, &backend, "policy clone").await.unwrap();
        check!(session.len() == 3);
        check!(session.selected_record().unwrap().name == "second_clone");

        run(&mut session, &backend, "policy delete\npolicy new").await.unwrap();
        check!(session.len() == 3);
        check!(session.selected_record().unwrap().name == "");
    }

    #[rstest]
    #[tokio::test]
    async fn test_form_commit(two_policy_session: Session) {
        let mut session = two_policy_session;
        let backend = StubBackend::default();

        run(&mut session, &backend, "form name=renamed comment=\"\"").await.unwrap();
        check!(session.selected_record().unwrap().name == "first");

        run(&mut session, &backend, "commit").await.unwrap();
        check!(session.selected_record().unwrap().name == "renamed");
    }

    #[rstest]
    #[tokio::test]
    async fn test_load_and_save() {
        let mut session = Session::default();
        let backend = StubBackend::with_template("office");

        run(&mut session, &backend, "load office\nsave office-copy").await.unwrap();

        check!(session.template() == Some("office-copy"));
        check!(*backend.saved.lock().unwrap() == vec!["office-copy"]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_import_catalog(two_policy_session: Session) {
        let mut session = two_policy_session;
        let backend = StubBackend::default();

        run(&mut session, &backend, "import-catalog device.conf").await.unwrap();
        check!(session.catalog().vips == vec!["vip-web"]);

        run(&mut session, &backend, "import-catalog catalog.json").await.unwrap();
        check!(session.catalog().interfaces == vec!["port1", "port2", "wan1"]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_sample_script(two_policy_session: Session) {
        let mut session = two_policy_session;
        let backend = StubBackend::default();
        let text = std::fs::read_to_string(fixture_dir().join("edit.script")).unwrap();

        run(&mut session, &backend, &text).await.unwrap();

        check!(session.len() == 3);
        let r = session.selected_record().unwrap();
        check!(r.name == "block-dmz");
        check!(r.action == Action::Deny);
        check!(r.addresses(Direction::Dst).addresses == vec!["dmz-net"]);
        check!(r.services.len() == 2);
        check!(r.services[1].service_name() == "custom_alt-http");
    }

    #[rstest]
    #[tokio::test]
    async fn test_template_commands(two_policy_session: Session) {
        let mut session = two_policy_session;
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), &EditorConfig::default())
            .await
            .unwrap();
        let runner = ScriptRunner::new(&backend, dir.path());

        runner
            .run(&mut session, "save office\ntemplate clone office\ntemplate list")
            .await
            .unwrap();
        let names = backend.list_templates().await.unwrap();
        check!(names.len() == 2);
        check!(names[1].starts_with("office_clone_"));

        runner.run(&mut session, "template rename office hq").await.unwrap();
        check!(session.template() == Some("hq"));

        runner
            .run(&mut session, "template export hq hq.json\ntemplate delete hq")
            .await
            .unwrap();
        check!(dir.path().join("hq.json").exists());
        check!(session.template().is_none());
        check!(!backend.list_templates().await.unwrap().contains(&"hq".to_string()));

        runner
            .run(&mut session, "template import hq.json name=restored\nload restored")
            .await
            .unwrap();
        check!(session.template() == Some("restored"));
        let names: Vec<&str> = session.policies().map(|p| p.name.as_str()).collect();
        check!(names == vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_shorten() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), &EditorConfig::default())
            .await
            .unwrap();
        let runner = ScriptRunner::new(&backend, dir.path());
        let mut session = Session::default();
        let url = format!("{}office", EditorConfig::default().trusted_url_prefix);

        runner
            .run_line(&mut session, &format!("shorten {}", url))
            .await
            .unwrap();
        let stored = std::fs::read_to_string(dir.path().join("templates/short_urls.yaml")).unwrap();
        check!(stored.contains(&url));

        let err = runner
            .run_line(&mut session, "shorten http://elsewhere.example/x")
            .await
            .unwrap_err();
        check!(format!("{:#}", err).contains("only allowed"));
    }

    #[rstest]
    #[case("bogus", "unknown command")]
    #[case("policy explode", "unknown policy operation")]
    #[case("interface up add", "expected src or dst")]
    #[case("address src set 5 address:x", "out of range")]
    #[case("address src set 0 host:x", "unknown kind")]
    #[case("service add\nservice set 0 template:HTTP port=80", "invalid selection")]
    #[case("set colour=blue", "unknown field")]
    #[case("policy select nothing", "not found")]
    #[case("template explode", "unknown template operation")]
    #[case("template rename nothing hq", "not found")]
    #[case("template delete first name=x", "unexpected option")]
    #[case("template import missing.json", "read")]
    #[tokio::test]
    async fn test_errors(two_policy_session: Session, #[case] line: &str, #[case] message: &str) {
        let mut session = two_policy_session;
        let backend = StubBackend::default();

        let err = run(&mut session, &backend, &format!("# header\n\n{}", line))
            .await
            .unwrap_err();

        let last = line.lines().count() + 2;
        check!(err.to_string() == format!("line {}: {}", last, line.lines().last().unwrap()));
        check!(format!("{:#}", err).contains(message));
    }

    #[rstest]
    #[tokio::test]
    async fn test_error_stops_script(two_policy_session: Session) {
        let mut session = two_policy_session;
        let backend = StubBackend::default();

        let res = run(&mut session, &backend, "set name=a\npolicy select gone\nset name=b").await;
        check!(res.is_err());
        check!(session.selected_record().unwrap().name == "a");
    }

    #[tokio::test]
    async fn test_set_without_policy() {
        let mut session = Session::default();
        let backend = StubBackend::default();

        let err = ScriptRunner::new(&backend, Path::new("."))
            .run_line(&mut session, "set name=x")
            .await
            .unwrap_err();

        check!(matches!(
            err.downcast_ref::<EditorError>(),
            Some(EditorError::NoBoundRecord)
        ));
        check!(session.get(&PolicyId::from("x")).is_err());
    }
}
