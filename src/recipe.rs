//! The built-in RabbitMQ broker recipe
//!
//! Declares, in order, everything a broker host needs: Erlang, the broker
//! package from the vendor's repository (Debian) or release RPM (RedHat),
//! configuration files, the init script, the optional cluster cookie, the
//! service itself, and the administrator account.

use declarative::{
    Action, Condition, PlatformBranches, Resource, ResourceId, ResourceKind, Script,
};

use crate::config::WarrenConfig;

pub const SERVICE: &str = "rabbitmq-server";
const INIT_SCRIPT: &str = "/etc/init.d/rabbitmq-server";
const RUN_DIR: &str = "/var/run/rabbitmq";
const COOKIE: &str = "/var/lib/rabbitmq/.erlang.cookie";
const RABBITMQADMIN: &str = "/usr/sbin/rabbitmqadmin";

/// Single-quote `value` for `sh`
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn root_owned(resource: Resource, mode: &str) -> Resource {
    resource.owner("root").group("root").mode(mode)
}

/// Build the broker script for a node configured by `config`
pub fn broker(config: &WarrenConfig) -> Script {
    let rabbit = &config.rabbitmq;
    let service = ResourceId::new(ResourceKind::Service, SERVICE);
    let config_dir = rabbit.config_dir.trim_end_matches('/');
    let download_dir = config.paths.download_dir();
    let rpm_path = download_dir.join(rabbit.rpm_file_name()).display().to_string();
    let key_path = download_dir
        .join("rabbitmq-signing-key-public.asc")
        .display()
        .to_string();
    let enabled_plugins = format!("{config_dir}/enabled_plugins");
    let user = shell_quote(&rabbit.default_user);
    let pass = shell_quote(&rabbit.default_pass);

    let mut script = Script::new()
        .platform(
            PlatformBranches::new()
                .debian([Resource::package("erlang-nox")])
                .redhat([Resource::package("erlang")]),
        )
        .resource(root_owned(Resource::directory(config_dir), "0755"))
        .resource(
            root_owned(
                Resource::template(format!("{config_dir}/rabbitmq-env.conf")),
                "0644",
            )
            .source("rabbitmq-env.conf")
            .notifies_delayed(Action::Restart, service.clone()),
        )
        .platform(
            PlatformBranches::new()
                .debian([
                    Resource::apt_repository("rabbitmq")
                        .attr("uri", &rabbit.apt_uri)
                        .attr("distribution", &rabbit.apt_distribution)
                        .attr("components", rabbit.apt_components.join(" "))
                        .attr("key", &rabbit.signing_key_url),
                    Resource::package(SERVICE),
                ])
                .redhat([
                    Resource::remote_file(&rpm_path)
                        .source(rabbit.rpm_url())
                        .action(Action::CreateIfMissing),
                    Resource::remote_file(&key_path)
                        .source(&rabbit.signing_key_url)
                        .action(Action::CreateIfMissing),
                    Resource::execute("import rabbitmq signing key")
                        .command(format!("rpm --import {key_path}"))
                        .attr("interpreter", "bash"),
                    Resource::service("qpidd").actions([Action::Disable, Action::Stop]),
                    Resource::package(SERVICE).source(&rpm_path),
                    Resource::execute("enable management plugin")
                        .command("/usr/sbin/rabbitmq-plugins enable rabbitmq_management"),
                ]),
        )
        .resource(
            Resource::directory(RUN_DIR)
                .owner("rabbitmq")
                .group("rabbitmq")
                .mode("0755"),
        )
        .resource(root_owned(Resource::file(INIT_SCRIPT), "0755").source("rabbitmq-server"));

    // Changing an existing cookie stays a manual step
    if rabbit.cluster {
        script.add(
            Resource::template(COOKIE)
                .source("doterlang.cookie")
                .owner("rabbitmq")
                .group("rabbitmq")
                .mode("0400")
                .attr("sensitive", "true")
                .creates(COOKIE),
        );
    }

    script
        .resource(
            Resource::execute("change permissions on enabled_plugins")
                .command(format!("chmod 644 {enabled_plugins}"))
                .only_if(Condition::PathExists(enabled_plugins.into())),
        )
        .resource(
            root_owned(
                Resource::template(format!("{config_dir}/rabbitmq.config")),
                "0644",
            )
            .source("rabbitmq.config")
            .notifies_immediately(Action::Restart, service),
        )
        .resource(
            Resource::service(SERVICE)
                .attr("stop_command", "/usr/sbin/rabbitmqctl stop")
                .attr("start_command", "service rabbitmq-server start")
                .attr("supports_status", "true")
                .attr("supports_restart", "true")
                .actions([Action::Enable, Action::Restart]),
        )
        // 0 = created, 2 = already exists
        .resource(
            Resource::execute("create admin user")
                .command(format!("rabbitmqctl add_user {user} {pass}"))
                .attr("sensitive", "true")
                .returns([0, 2]),
        )
        .resource(
            Resource::execute("give admin user administrator tag")
                .command(format!("rabbitmqctl set_user_tags {user} administrator")),
        )
        .resource(
            Resource::execute("download rabbitmqadmin")
                .command(format!(
                    "wget --http-user={user} --http-password={pass} -O {RABBITMQADMIN} http://localhost:{}/cli/rabbitmqadmin",
                    rabbit.management_port
                ))
                .attr("sensitive", "true"),
        )
        .resource(
            Resource::execute("make rabbitmqadmin executable")
                .command(format!("chmod 755 {RABBITMQADMIN}")),
        )
        // 0 = deleted, 2 = already gone
        .resource(
            Resource::execute("remove guest account")
                .command("rabbitmqctl delete_user guest")
                .returns([0, 2]),
        )
}
