//! Type registry: stores every registration, keyed by contract.
//!
//! The registry maps a [`TypeKey`] to either one plain registration
//! (instance, class, singleton factory, transient factory) or a list of
//! implementation bindings. It only holds data: lookups pick the
//! candidates active for a profile, resolution lives in
//! [`crate::resolver`].

use std::any::{Any, type_name};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{
    AmbiguousRegistrationError, BoxError, DuplicateReason, DuplicateRegistrationError,
    PorticoError, Result,
};
use crate::key::TypeKey;
use crate::lifecycle::Lifecycle;
use crate::lifetime::Lifetime;
use crate::profile::{Profile, ProfileSet};
use crate::resolver::Injector;

/// A type-erased resolved value.
///
/// Holds an `Arc<T>` for the contract `T`, so trait objects can be
/// handed out without re-boxing.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Type-erased production rule shared between threads.
pub type Producer = Arc<dyn Fn(&Injector<'_>) -> Result<Component> + Send + Sync>;

/// A resolved instance plus its lifecycle view, if it has one.
#[derive(Clone)]
pub struct Component {
    instance: Instance,
    lifecycle: Option<Arc<dyn Lifecycle>>,
}

impl Component {
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            instance: Arc::new(value),
            lifecycle: None,
        }
    }

    pub(crate) fn with_lifecycle<T: ?Sized + Send + Sync + 'static>(
        value: Arc<T>,
        lifecycle: Option<Arc<dyn Lifecycle>>,
    ) -> Self {
        Self {
            instance: Arc::new(value),
            lifecycle,
        }
    }

    /// Returns the contract handle if this component holds an `Arc<T>`.
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.instance.downcast_ref::<Arc<T>>().cloned()
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn lifecycle(&self) -> Option<&Arc<dyn Lifecycle>> {
        self.lifecycle.as_ref()
    }

    /// Reference identity of the underlying cached value.
    pub fn ptr_eq(&self, other: &Component) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("lifecycle", &self.lifecycle.is_some())
            .finish_non_exhaustive()
    }
}

/// A declared constructor dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub key: TypeKey,
    /// `true` when the consumer wants every multi-binding implementation.
    pub many: bool,
}

/// A zero-argument production rule (class, singleton or transient factory).
#[derive(Clone)]
pub struct Factory {
    pub(crate) name: &'static str,
    pub(crate) producer: Producer,
}

/// One implementation of a contract, with its selection metadata.
///
/// Built from a typed [`Binding`]; fields are fixed once registered.
#[derive(Clone)]
pub struct Implementation {
    pub(crate) name: &'static str,
    pub(crate) producer: Producer,
    pub(crate) profiles: ProfileSet,
    pub(crate) lifetime: Lifetime,
    pub(crate) multi: bool,
    pub(crate) priority: i32,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) lifecycle: bool,
}

impl Implementation {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_lifecycle(&self) -> bool {
        self.lifecycle
    }
}

/// How a contract is satisfied.
#[derive(Clone)]
pub enum Registration {
    /// A pre-built value returned as-is on every resolution.
    Instance { name: &'static str, component: Component },
    /// A zero-argument constructor, invoked fresh on every resolution.
    Class(Factory),
    /// Called once per container; the result is cached.
    SingletonFactory(Factory),
    /// Called on every resolution.
    TransientFactory(Factory),
    /// One implementation binding; a contract may accumulate several.
    Binding(Implementation),
}

impl Registration {
    pub fn instance<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Registration::Instance {
            name: type_name::<T>(),
            component: Component::new(value),
        }
    }

    pub fn class<T: Default + Send + Sync + 'static>() -> Self {
        Registration::Class(Factory {
            name: type_name::<T>(),
            producer: Arc::new(|_| Ok(Component::new(Arc::new(T::default())))),
        })
    }

    pub fn singleton_factory<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Registration::SingletonFactory(Factory {
            name: type_name::<T>(),
            producer: Arc::new(move |_| Ok(Component::new(Arc::new(factory())))),
        })
    }

    pub fn transient_factory<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Registration::TransientFactory(Factory {
            name: type_name::<T>(),
            producer: Arc::new(move |_| Ok(Component::new(Arc::new(factory())))),
        })
    }

    pub fn kind(&self) -> RegistrationKind {
        match self {
            Registration::Instance { .. } => RegistrationKind::Instance,
            Registration::Class(_) => RegistrationKind::Class,
            Registration::SingletonFactory(_) => RegistrationKind::SingletonFactory,
            Registration::TransientFactory(_) => RegistrationKind::TransientFactory,
            Registration::Binding(_) => RegistrationKind::Binding,
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Registration::Instance { name, .. } => f.debug_tuple("Instance").field(name).finish(),
            Registration::Class(factory) => f.debug_tuple("Class").field(&factory.name).finish(),
            Registration::SingletonFactory(factory) => {
                f.debug_tuple("SingletonFactory").field(&factory.name).finish()
            }
            Registration::TransientFactory(factory) => {
                f.debug_tuple("TransientFactory").field(&factory.name).finish()
            }
            Registration::Binding(implementation) => f
                .debug_struct("Binding")
                .field("implementation", &implementation.name)
                .field("profiles", &implementation.profiles)
                .field("lifetime", &implementation.lifetime)
                .field("multi", &implementation.multi)
                .field("priority", &implementation.priority)
                .field("lifecycle", &implementation.lifecycle)
                .finish(),
        }
    }
}

/// The tag of a [`Registration`], for diagnostics and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationKind {
    Instance,
    Class,
    SingletonFactory,
    TransientFactory,
    Binding,
}

impl RegistrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationKind::Instance => "instance",
            RegistrationKind::Class => "class",
            RegistrationKind::SingletonFactory => "singleton factory",
            RegistrationKind::TransientFactory => "transient factory",
            RegistrationKind::Binding => "implementation binding",
        }
    }
}

/// A finished registration as handed over by a discovery collaborator.
#[derive(Debug, Clone)]
pub struct RegistrationRecord {
    pub key: TypeKey,
    pub registration: Registration,
}

impl RegistrationRecord {
    pub fn new(key: TypeKey, registration: Registration) -> Self {
        Self { key, registration }
    }

    pub fn instance<T: Send + Sync + 'static>(value: T) -> Self {
        Self::shared(Arc::new(value))
    }

    pub fn shared<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self::new(TypeKey::of::<T>(), Registration::instance(value))
    }

    pub fn class<T: Default + Send + Sync + 'static>() -> Self {
        Self::new(TypeKey::of::<T>(), Registration::class::<T>())
    }

    pub fn singleton_factory<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(TypeKey::of::<T>(), Registration::singleton_factory(factory))
    }

    pub fn transient_factory<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(TypeKey::of::<T>(), Registration::transient_factory(factory))
    }

    pub fn binding<C, I>(binding: Binding<C, I>) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Send + Sync + 'static,
    {
        Self::new(TypeKey::of::<C>(), binding.into_registration())
    }
}

// ── Typed binding builder ──

type BindingFactory<I> = Arc<dyn Fn(&Injector<'_>) -> std::result::Result<I, BoxError> + Send + Sync>;

/// Declares that implementation `I` satisfies contract `C`.
///
/// Every field is optional and order-independent. Defaults: active under
/// every profile (`*`), [`Lifetime::Singleton`], single-binding,
/// priority 0, no declared dependencies, not lifecycle-managed.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use portico_container::prelude::*;
///
/// trait Notifier: Send + Sync {
///     fn notify(&self, msg: &str) -> String;
/// }
///
/// #[derive(Default)]
/// struct FakeNotifier;
/// impl Notifier for FakeNotifier {
///     fn notify(&self, msg: &str) -> String { format!("fake: {msg}") }
/// }
///
/// let container = Container::builder().profile(Profile::TEST).build().unwrap();
/// container
///     .register_binding(
///         Binding::<dyn Notifier, FakeNotifier>::new(
///             |_| Ok(FakeNotifier),
///             |n| n as Arc<dyn Notifier>,
///         )
///         .profile(Profile::TEST),
///     )
///     .unwrap();
///
/// let notifier = container.resolve::<dyn Notifier>().unwrap();
/// assert_eq!(notifier.notify("hi"), "fake: hi");
/// ```
pub struct Binding<C: ?Sized, I> {
    factory: BindingFactory<I>,
    upcast: fn(Arc<I>) -> Arc<C>,
    lifecycle_view: Option<fn(Arc<I>) -> Arc<dyn Lifecycle>>,
    profiles: Vec<Profile>,
    lifetime: Lifetime,
    multi: bool,
    priority: i32,
    dependencies: Vec<Dependency>,
    _contract: PhantomData<fn() -> Box<C>>,
}

impl<C, I> Binding<C, I>
where
    C: ?Sized + Send + Sync + 'static,
    I: Send + Sync + 'static,
{
    /// `factory` builds the implementation; `upcast` turns it into the
    /// contract handle (`|i| i as Arc<dyn Contract>`).
    pub fn new<F>(factory: F, upcast: fn(Arc<I>) -> Arc<C>) -> Self
    where
        F: Fn(&Injector<'_>) -> std::result::Result<I, BoxError> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            upcast,
            lifecycle_view: None,
            profiles: Vec::new(),
            lifetime: Lifetime::default(),
            multi: false,
            priority: 0,
            dependencies: Vec::new(),
            _contract: PhantomData,
        }
    }

    pub fn profile(mut self, profile: impl Into<Profile>) -> Self {
        self.profiles.push(profile.into());
        self
    }

    pub fn profiles<P: Into<Profile>>(mut self, profiles: impl IntoIterator<Item = P>) -> Self {
        self.profiles.extend(profiles.into_iter().map(Into::into));
        self
    }

    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    /// Ordering among multi-binding implementations; lower comes first.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Declares a constructor dependency on contract `D`.
    pub fn depends_on<D: ?Sized + 'static>(mut self) -> Self {
        self.dependencies.push(Dependency {
            key: TypeKey::of::<D>(),
            many: false,
        });
        self
    }

    /// Declares a dependency on every implementation of multi-binding `D`.
    pub fn depends_on_all<D: ?Sized + 'static>(mut self) -> Self {
        self.dependencies.push(Dependency {
            key: TypeKey::of::<D>(),
            many: true,
        });
        self
    }

    /// Declares a dependency on an explicit (e.g. qualified) key.
    pub fn depends_on_key(mut self, key: TypeKey) -> Self {
        self.dependencies.push(Dependency { key, many: false });
        self
    }

    pub fn into_registration(self) -> Registration {
        let Binding {
            factory,
            upcast,
            lifecycle_view,
            profiles,
            lifetime,
            multi,
            priority,
            dependencies,
            ..
        } = self;

        let contract = TypeKey::of::<C>();
        let lifecycle = lifecycle_view.is_some();
        let producer: Producer = Arc::new(move |injector: &Injector<'_>| {
            let concrete = Arc::new(
                factory(injector).map_err(|source| PorticoError::from_factory(&contract, source))?,
            );
            let view = lifecycle_view.map(|view| view(Arc::clone(&concrete)));
            Ok(Component::with_lifecycle(upcast(concrete), view))
        });

        Registration::Binding(Implementation {
            name: type_name::<I>(),
            producer,
            profiles: ProfileSet::of(profiles),
            lifetime,
            multi,
            priority,
            dependencies,
            lifecycle,
        })
    }
}

impl<I: Send + Sync + 'static> Binding<I, I> {
    /// Binds a concrete type as its own contract.
    pub fn service<F>(factory: F) -> Self
    where
        F: Fn(&Injector<'_>) -> std::result::Result<I, BoxError> + Send + Sync + 'static,
    {
        Self::new(factory, identity::<I>)
    }
}

impl<C, I> Binding<C, I>
where
    C: ?Sized + Send + Sync + 'static,
    I: Lifecycle,
{
    /// Marks the implementation as lifecycle-managed.
    ///
    /// Only available when `I: Lifecycle`, so the capability is checked
    /// when the binding is declared.
    pub fn lifecycle(mut self) -> Self {
        self.lifecycle_view = Some(as_lifecycle::<I>);
        self
    }
}

fn identity<I>(value: Arc<I>) -> Arc<I> {
    value
}

fn as_lifecycle<I: Lifecycle>(value: Arc<I>) -> Arc<dyn Lifecycle> {
    value
}

// ── Registry ──

/// A registration normalised for lookup and graph building.
#[derive(Clone)]
pub(crate) struct Candidate {
    pub key: TypeKey,
    /// Declaration order; doubles as the cache slot id.
    pub id: u64,
    pub kind: RegistrationKind,
    pub name: &'static str,
    pub lifetime: Lifetime,
    pub profiles: ProfileSet,
    pub multi: bool,
    pub priority: i32,
    pub dependencies: Vec<Dependency>,
    pub lifecycle: bool,
    pub source: Source,
}

#[derive(Clone)]
pub(crate) enum Source {
    Shared(Component),
    Produce(Producer),
}

impl Candidate {
    fn new(key: TypeKey, id: u64, registration: Registration) -> Self {
        let kind = registration.kind();
        let (name, lifetime, source, implementation) = match registration {
            Registration::Instance { name, component } => {
                (name, Lifetime::Singleton, Source::Shared(component), None)
            }
            Registration::Class(f) => (f.name, Lifetime::Transient, Source::Produce(f.producer), None),
            Registration::SingletonFactory(f) => {
                (f.name, Lifetime::Singleton, Source::Produce(f.producer), None)
            }
            Registration::TransientFactory(f) => {
                (f.name, Lifetime::Transient, Source::Produce(f.producer), None)
            }
            Registration::Binding(i) => {
                let source = Source::Produce(Arc::clone(&i.producer));
                (i.name, i.lifetime, source, Some(i))
            }
        };

        match implementation {
            Some(i) => Candidate {
                key,
                id,
                kind,
                name,
                lifetime,
                profiles: i.profiles,
                multi: i.multi,
                priority: i.priority,
                dependencies: i.dependencies,
                lifecycle: i.lifecycle,
                source,
            },
            None => Candidate {
                key,
                id,
                kind,
                name,
                lifetime,
                profiles: ProfileSet::all(),
                multi: false,
                priority: 0,
                dependencies: Vec::new(),
                lifecycle: false,
                source,
            },
        }
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("name", &self.name)
            .field("lifetime", &self.lifetime)
            .field("profiles", &self.profiles)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

#[derive(Debug)]
enum Entry {
    Plain(Arc<Candidate>),
    Bindings {
        multi: bool,
        candidates: Vec<Arc<Candidate>>,
    },
}

impl Entry {
    fn from_candidate(candidate: Candidate) -> Self {
        if candidate.kind == RegistrationKind::Binding {
            Entry::Bindings {
                multi: candidate.multi,
                candidates: vec![Arc::new(candidate)],
            }
        } else {
            Entry::Plain(Arc::new(candidate))
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Entry::Plain(c) => c.kind.as_str(),
            Entry::Bindings { .. } => RegistrationKind::Binding.as_str(),
        }
    }

    fn candidates(&self) -> &[Arc<Candidate>] {
        match self {
            Entry::Plain(c) => std::slice::from_ref(c),
            Entry::Bindings { candidates, .. } => candidates,
        }
    }
}

/// Result of looking up a contract for a profile.
#[derive(Debug)]
pub(crate) enum Lookup {
    Single(Arc<Candidate>),
    /// Ordered by ascending priority, then declaration order.
    Multi(Vec<Arc<Candidate>>),
}

/// Stores all registrations.
///
/// Write-once-then-read-many: the container guards it with a
/// reader–writer lock and never holds that lock while producing.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: HashMap<TypeKey, Entry>,
    order: Vec<TypeKey>,
    next_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `registration` under contract `key`.
    ///
    /// # Errors
    /// - [`PorticoError::DuplicateRegistration`] if a plain registration
    ///   already exists (and `allow_override` is false), or single and
    ///   multi bindings are mixed
    /// - [`PorticoError::AmbiguousRegistration`] if a single-binding
    ///   implementation overlaps another one's profiles
    pub fn register(
        &mut self,
        key: TypeKey,
        registration: Registration,
        allow_override: bool,
    ) -> Result<()> {
        let id = self.next_id;
        let candidate = Candidate::new(key.clone(), id, registration);

        if let Some(existing) = self.entries.get_mut(&key) {
            match existing {
                Entry::Bindings { multi, candidates } if candidate.kind == RegistrationKind::Binding => {
                    if *multi != candidate.multi {
                        return Err(PorticoError::DuplicateRegistration(
                            DuplicateRegistrationError {
                                key,
                                reason: DuplicateReason::MixedMultiplicity,
                            },
                        ));
                    }
                    if !candidate.multi {
                        if let Some(clash) = candidates
                            .iter()
                            .find(|c| c.profiles.overlaps(&candidate.profiles))
                        {
                            return Err(PorticoError::AmbiguousRegistration(
                                AmbiguousRegistrationError {
                                    contract: key,
                                    profile: shared_profile(&clash.profiles, &candidate.profiles),
                                    implementations: vec![clash.name, candidate.name],
                                    multi: false,
                                },
                            ));
                        }
                    }
                    debug!(
                        key = %key,
                        implementation = candidate.name,
                        profiles = %candidate.profiles,
                        lifetime = %candidate.lifetime,
                        multi = candidate.multi,
                        "Registered implementation binding"
                    );
                    candidates.push(Arc::new(candidate));
                }
                other => {
                    if !allow_override {
                        return Err(PorticoError::DuplicateRegistration(
                            DuplicateRegistrationError {
                                key,
                                reason: DuplicateReason::AlreadyRegistered {
                                    existing: other.kind_name(),
                                },
                            },
                        ));
                    }
                    debug!(key = %key, kind = candidate.kind.as_str(), "Overriding registration");
                    *other = Entry::from_candidate(candidate);
                }
            }
            self.next_id += 1;
            return Ok(());
        }

        debug!(
            key = %key,
            kind = candidate.kind.as_str(),
            lifetime = %candidate.lifetime,
            "Registered"
        );
        self.order.push(key.clone());
        self.entries.insert(key, Entry::from_candidate(candidate));
        self.next_id += 1;
        Ok(())
    }

    /// Finds the candidates of `key` active under `profile`.
    ///
    /// Returns `Ok(None)` when nothing is registered (or no single-binding
    /// implementation matches the profile).
    pub fn lookup(&self, key: &TypeKey, profile: Option<&Profile>) -> Result<Option<Lookup>> {
        let Some(entry) = self.entries.get(key) else {
            trace!(key = %key, "No registration");
            return Ok(None);
        };

        match entry {
            Entry::Plain(candidate) => Ok(Some(Lookup::Single(Arc::clone(candidate)))),
            Entry::Bindings { multi: true, candidates } => {
                let mut active: Vec<Arc<Candidate>> = candidates
                    .iter()
                    .filter(|c| c.profiles.matches(profile))
                    .cloned()
                    .collect();
                active.sort_by_key(|c| (c.priority, c.id));
                Ok(Some(Lookup::Multi(active)))
            }
            Entry::Bindings { multi: false, candidates } => {
                let active: Vec<&Arc<Candidate>> = candidates
                    .iter()
                    .filter(|c| c.profiles.matches(profile))
                    .collect();
                match active.as_slice() {
                    [] => Ok(None),
                    [only] => Ok(Some(Lookup::Single(Arc::clone(only)))),
                    many => Err(PorticoError::AmbiguousRegistration(
                        AmbiguousRegistrationError {
                            contract: key.clone(),
                            profile: profile.cloned(),
                            implementations: many.iter().map(|c| c.name).collect(),
                            multi: false,
                        },
                    )),
                }
            }
        }
    }

    /// Every candidate active under `profile`, in declaration order.
    pub fn active_candidates(&self, profile: Option<&Profile>) -> Vec<Arc<Candidate>> {
        let mut active: Vec<Arc<Candidate>> = self
            .entries
            .values()
            .flat_map(Entry::candidates)
            .filter(|c| c.profiles.matches(profile))
            .cloned()
            .collect();
        active.sort_by_key(|c| c.id);
        active
    }

    /// All candidates of one contract regardless of profile.
    pub fn candidates_of(&self, key: &TypeKey) -> &[Arc<Candidate>] {
        self.entries.get(key).map(Entry::candidates).unwrap_or(&[])
    }

    pub fn is_multi(&self, key: &TypeKey) -> bool {
        matches!(self.entries.get(key), Some(Entry::Bindings { multi: true, .. }))
    }

    /// Profile → implementation names for one contract.
    pub fn implementations_for(&self, key: &TypeKey) -> BTreeMap<Profile, Vec<&'static str>> {
        let mut by_profile: BTreeMap<Profile, Vec<&'static str>> = BTreeMap::new();
        for candidate in self.candidates_of(key) {
            for profile in candidate.profiles.iter() {
                by_profile.entry(profile.clone()).or_default().push(candidate.name);
            }
        }
        by_profile
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Contract keys in registration order.
    pub fn keys(&self) -> &[TypeKey] {
        &self.order
    }

    /// Returns the number of registered contracts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no contracts are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn shared_profile(a: &ProfileSet, b: &ProfileSet) -> Option<Profile> {
    if a.is_wildcard() || b.is_wildcard() {
        return Some(Profile::ALL);
    }
    a.iter().find(|p| b.iter().any(|q| q == *p)).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Notifier: Send + Sync {
        fn channel(&self) -> &'static str;
    }

    #[derive(Default)]
    struct EmailNotifier;
    impl Notifier for EmailNotifier {
        fn channel(&self) -> &'static str {
            "email"
        }
    }

    #[derive(Default)]
    struct FakeNotifier;
    impl Notifier for FakeNotifier {
        fn channel(&self) -> &'static str {
            "fake"
        }
    }

    fn email() -> Binding<dyn Notifier, EmailNotifier> {
        Binding::new(|_| Ok(EmailNotifier), |n| n as Arc<dyn Notifier>)
    }

    fn fake() -> Binding<dyn Notifier, FakeNotifier> {
        Binding::new(|_| Ok(FakeNotifier), |n| n as Arc<dyn Notifier>)
    }

    fn notifier_key() -> TypeKey {
        TypeKey::of::<dyn Notifier>()
    }

    #[test]
    fn register_and_lookup_plain() {
        let mut reg = Registry::new();
        let key = TypeKey::of::<u32>();
        reg.register(key.clone(), Registration::singleton_factory(|| 7u32), false)
            .unwrap();
        assert!(matches!(reg.lookup(&key, None).unwrap(), Some(Lookup::Single(_))));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn duplicate_plain_fails() {
        let mut reg = Registry::new();
        let key = TypeKey::of::<u32>();
        reg.register(key.clone(), Registration::class::<u32>(), false).unwrap();
        let err = reg.register(key, Registration::class::<u32>(), false).unwrap_err();
        match err {
            PorticoError::DuplicateRegistration(e) => {
                assert_eq!(e.reason, DuplicateReason::AlreadyRegistered { existing: "class" });
            }
            other => panic!("Expected DuplicateRegistration, got: {other:?}"),
        }
    }

    #[test]
    fn duplicate_with_override_ok() {
        let mut reg = Registry::new();
        let key = TypeKey::of::<u32>();
        reg.register(key.clone(), Registration::class::<u32>(), false).unwrap();
        assert!(reg.register(key, Registration::class::<u32>(), true).is_ok());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn binding_on_plain_contract_is_duplicate() {
        let mut reg = Registry::new();
        reg.register(notifier_key(), Registration::instance(Arc::new(FakeNotifier) as Arc<dyn Notifier>), false)
            .unwrap();
        let err = reg.register(notifier_key(), email().into_registration(), false);
        assert!(matches!(err, Err(PorticoError::DuplicateRegistration(_))));
    }

    #[test]
    fn profile_selects_single_binding() {
        let mut reg = Registry::new();
        reg.register(notifier_key(), email().profile(Profile::PRODUCTION).into_registration(), false)
            .unwrap();
        reg.register(notifier_key(), fake().profile(Profile::TEST).into_registration(), false)
            .unwrap();

        match reg.lookup(&notifier_key(), Some(&Profile::TEST)).unwrap() {
            Some(Lookup::Single(c)) => assert!(c.name.contains("FakeNotifier")),
            other => panic!("Expected single candidate, got: {other:?}"),
        }
        assert!(reg.lookup(&notifier_key(), Some(&Profile::STAGING)).unwrap().is_none());
    }

    #[test]
    fn overlapping_single_bindings_are_ambiguous_at_registration() {
        let mut reg = Registry::new();
        reg.register(notifier_key(), email().profile(Profile::PRODUCTION).into_registration(), false)
            .unwrap();
        let err = reg
            .register(notifier_key(), fake().profile(Profile::PRODUCTION).into_registration(), false)
            .unwrap_err();
        match err {
            PorticoError::AmbiguousRegistration(e) => {
                assert_eq!(e.profile, Some(Profile::PRODUCTION));
                assert_eq!(e.implementations.len(), 2);
            }
            other => panic!("Expected AmbiguousRegistration, got: {other:?}"),
        }
    }

    #[test]
    fn wildcard_overlaps_any_tag() {
        let mut reg = Registry::new();
        reg.register(notifier_key(), email().into_registration(), false).unwrap();
        let err = reg.register(notifier_key(), fake().profile(Profile::TEST).into_registration(), false);
        assert!(matches!(err, Err(PorticoError::AmbiguousRegistration(_))));
    }

    #[test]
    fn no_profile_with_two_bindings_is_ambiguous_at_lookup() {
        let mut reg = Registry::new();
        reg.register(notifier_key(), email().profile(Profile::PRODUCTION).into_registration(), false)
            .unwrap();
        reg.register(notifier_key(), fake().profile(Profile::TEST).into_registration(), false)
            .unwrap();
        assert!(matches!(
            reg.lookup(&notifier_key(), None),
            Err(PorticoError::AmbiguousRegistration(_))
        ));
    }

    #[test]
    fn mixing_single_and_multi_fails() {
        let mut reg = Registry::new();
        reg.register(notifier_key(), email().multi(true).into_registration(), false)
            .unwrap();
        let err = reg
            .register(notifier_key(), fake().profile(Profile::TEST).into_registration(), false)
            .unwrap_err();
        match err {
            PorticoError::DuplicateRegistration(e) => {
                assert_eq!(e.reason, DuplicateReason::MixedMultiplicity);
            }
            other => panic!("Expected DuplicateRegistration, got: {other:?}"),
        }
    }

    #[test]
    fn multi_lookup_orders_by_priority_then_declaration() {
        let mut reg = Registry::new();
        reg.register(notifier_key(), email().multi(true).priority(20).into_registration(), false)
            .unwrap();
        reg.register(notifier_key(), fake().multi(true).priority(10).into_registration(), false)
            .unwrap();
        reg.register(notifier_key(), email().multi(true).priority(10).into_registration(), false)
            .unwrap();

        match reg.lookup(&notifier_key(), None).unwrap() {
            Some(Lookup::Multi(list)) => {
                let ids: Vec<u64> = list.iter().map(|c| c.id).collect();
                assert_eq!(ids, vec![1, 2, 0]);
            }
            other => panic!("Expected multi lookup, got: {other:?}"),
        }
    }

    #[test]
    fn implementations_by_profile() {
        let mut reg = Registry::new();
        reg.register(notifier_key(), email().profile(Profile::PRODUCTION).into_registration(), false)
            .unwrap();
        reg.register(notifier_key(), fake().profiles([Profile::TEST, Profile::DEVELOPMENT]).into_registration(), false)
            .unwrap();

        let map = reg.implementations_for(&notifier_key());
        assert_eq!(map.len(), 3);
        assert!(map[&Profile::PRODUCTION][0].contains("EmailNotifier"));
        assert!(map[&Profile::TEST][0].contains("FakeNotifier"));
    }

    #[test]
    fn active_candidates_follow_declaration_order() {
        let mut reg = Registry::new();
        reg.register(TypeKey::of::<u8>(), Registration::class::<u8>(), false).unwrap();
        reg.register(notifier_key(), fake().profile(Profile::TEST).into_registration(), false)
            .unwrap();
        reg.register(TypeKey::of::<u16>(), Registration::class::<u16>(), false).unwrap();

        let ids: Vec<u64> = reg.active_candidates(Some(&Profile::PRODUCTION)).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!(reg.active_candidates(Some(&Profile::TEST)).len(), 3);
    }
}
