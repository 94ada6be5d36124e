//! End-to-end wiring through the derive macros against an SQLite file.

use sprout_ioc::prelude::*;
use sprout_ioc::{
    transactional_proxy, Bean, BeanPostProcessor, DataSource, JdbcTemplate, RepositoryProxy,
    SqliteModule, TransactionState,
};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default, Clone, PartialEq, Entity)]
#[entity(table = "members")]
struct Member {
    id: i64,
    user_name: String,
    email: Option<String>,
    #[entity(skip)]
    cached_rank: u32,
}

trait MemberRepository: CrudRepository<Member> {
    fn find_by_email(&self, ctx: &TxContext, email: &str) -> Result<Option<Member>>;
}

impl MemberRepository for RepositoryProxy<Member> {
    fn find_by_email(&self, _ctx: &TxContext, _email: &str) -> Result<Option<Member>> {
        Ok(self.fallback("find_by_email"))
    }
}

#[derive(Default, Component)]
struct Clock;

trait MemberService: Send + Sync {
    fn join(&self, ctx: &TxContext, member: Member) -> Result<i64>;
    fn join_then_fail(&self, ctx: &TxContext, member: Member) -> Result<i64>;
    fn count(&self, ctx: &TxContext) -> Result<usize>;
}

#[derive(Component)]
#[component(
    service,
    transactional(join, join_then_fail),
    provides(dyn MemberService),
    proxy(dyn MemberService => MemberServiceProxy)
)]
struct SimpleMemberService {
    #[dep]
    clock: Arc<Clock>,
    #[inject]
    repository: Autowired<dyn MemberRepository>,
    joined: AtomicUsize,
}

impl MemberService for SimpleMemberService {
    fn join(&self, ctx: &TxContext, member: Member) -> Result<i64> {
        self.repository.save(ctx, &member)?;
        self.joined.fetch_add(1, Ordering::SeqCst);
        Ok(member.id)
    }

    fn join_then_fail(&self, ctx: &TxContext, member: Member) -> Result<i64> {
        self.repository.save(ctx, &member)?;
        Err(IocError::Internal(format!("duplicate user {}", member.user_name)))
    }

    fn count(&self, ctx: &TxContext) -> Result<usize> {
        Ok(self.repository.find_all(ctx)?.len())
    }
}

transactional_proxy! {
    struct MemberServiceProxy for SimpleMemberService: MemberService {
        fn join(&self, ctx: &TxContext, member: Member) -> Result<i64>;
        fn join_then_fail(&self, ctx: &TxContext, member: Member) -> Result<i64>;
        fn count(&self, ctx: &TxContext) -> Result<usize>;
    }
}

/// Counts every bean it sees.
#[derive(Default, Component)]
#[component(name = "auditor", post_processor)]
struct Auditor {
    seen: AtomicUsize,
}

impl BeanPostProcessor for Auditor {
    fn post_process(&self, bean: Arc<Bean>, _name: &str) -> Result<Option<Arc<Bean>>> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        Ok(Some(bean))
    }
}

struct App {
    _dir: tempfile::TempDir,
    context: ApplicationContext,
}

fn start() -> App {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("jdbc:sqlite:{}", dir.path().join("app.db").display());

    let context = ApplicationContext::builder()
        .environment(Environment::new().with("db.url", url))
        .module::<SqliteModule>()
        .register(Clock::descriptor())
        .register(Auditor::descriptor())
        .register(SimpleMemberService::descriptor())
        .register(
            TypeDescriptor::repository::<dyn MemberRepository, Member, _>(|proxy| {
                proxy as Arc<dyn MemberRepository>
            })
            .named("memberRepository"),
        )
        .run()
        .unwrap();

    context
        .get::<JdbcTemplate>()
        .unwrap()
        .update(
            &TxContext::new(),
            "CREATE TABLE members (id INTEGER PRIMARY KEY, user_name TEXT NOT NULL, email TEXT)",
            &[],
        )
        .unwrap();

    App { _dir: dir, context }
}

fn member(id: i64, name: &str) -> Member {
    Member {
        id,
        user_name: name.into(),
        email: Some(format!("{name}@example.com")),
        cached_rank: 0,
    }
}

#[test]
fn entity_derive_maps_fields() {
    assert_eq!(
        <Member as sprout_ioc::Entity>::fields(),
        &["id", "user_name", "email"]
    );
    assert_eq!(sprout_ioc::jdbc::table_of::<Member>(), "members");

    let value = member(3, "ada");
    assert_eq!(
        sprout_ioc::Entity::field_value(&value, "user_name"),
        Some(SqlValue::Text("ada".into()))
    );
    assert_eq!(sprout_ioc::Entity::field_value(&value, "cached_rank"), None);
}

#[test]
fn transactional_service_is_a_proxy_over_the_wired_target() {
    let app = start();

    let bean = app.context.get_bean("simpleMemberService").unwrap();
    assert!(bean.is_proxy());

    let target = bean.target::<SimpleMemberService>().unwrap();
    let repository = app.context.get::<dyn MemberRepository>().unwrap();
    assert!(Arc::ptr_eq(target.repository.get().unwrap(), &repository));
    assert!(Arc::ptr_eq(&target.clock, &app.context.get::<Clock>().unwrap()));
}

#[test]
fn commit_keeps_the_inserted_row() {
    let app = start();
    let service = app.context.get::<dyn MemberService>().unwrap();
    let ctx = TxContext::new();

    assert_eq!(service.join(&ctx, member(1, "ada")).unwrap(), 1);
    assert_eq!(ctx.last_outcome(), Some(TransactionState::Committed));
    assert_eq!(ctx.state(), TransactionState::NoTransaction);

    assert_eq!(service.count(&TxContext::new()).unwrap(), 1);
}

#[test]
fn rollback_leaves_no_row() {
    let app = start();
    let service = app.context.get::<dyn MemberService>().unwrap();
    let repository = app.context.get::<dyn MemberRepository>().unwrap();
    let ctx = TxContext::new();

    let err = service.join_then_fail(&ctx, member(2, "bob")).unwrap_err();
    assert!(err.to_string().contains("duplicate user bob"));
    assert_eq!(ctx.last_outcome(), Some(TransactionState::RolledBack));

    assert!(matches!(
        repository.find_by_id(&TxContext::new(), SqlValue::Integer(2)),
        Err(IocError::RecordNotFound { .. })
    ));
    assert!(repository.find_all(&TxContext::new()).unwrap().is_empty());
}

#[test]
fn save_then_find_by_id_round_trips() {
    let app = start();
    let repository = app.context.get::<dyn MemberRepository>().unwrap();
    let ctx = TxContext::new();

    let mut stored = member(7, "grace");
    stored.email = None;
    repository.save(&ctx, &stored).unwrap();

    assert_eq!(repository.find_by_id(&ctx, SqlValue::Integer(7)).unwrap(), stored);
    assert_eq!(repository.find_by_email(&ctx, "grace@example.com").unwrap(), None);
}

#[test]
fn post_processor_sees_application_beans() {
    let app = start();

    let auditor = app.context.get::<Auditor>().unwrap();
    assert!(auditor.seen.load(Ordering::SeqCst) >= 3);
    assert!(app.context.contains_bean("auditor"));
    assert_eq!(app.context.get_beans_of_type::<dyn BeanPostProcessor>().len(), 2);
}

#[test]
fn data_source_is_exposed_by_interface() {
    let app = start();
    let data_source = app.context.get::<dyn DataSource>().unwrap();
    let connection = data_source.get_connection().unwrap();
    assert!(connection.is_auto_commit());
    connection.close().unwrap();
}
