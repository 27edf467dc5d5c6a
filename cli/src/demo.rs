//! Specifications bundled with the `behave` binary.

use behave_core::{
    contains_exactly, contains_in_order, equal, equal_text, specify, Annotation, CapabilityMeta,
    ContextBuilder, Fault, Marker, SpecBuilder, SpecCatalog, SpecificationType, StrategyMarker,
    SuiteError, TypeMeta, RUN_WITH, SPEC_RUNNER,
};

pub fn catalog() -> Result<SpecCatalog, SuiteError> {
    SpecCatalog::new()
        .with(stack_spec())?
        .with(greeting_spec())?
        .with(smoke_spec())?
        .with(slow_spec())
}

#[derive(Debug, Default)]
struct Stack {
    items: Vec<u32>,
}

impl Stack {
    fn push(&mut self, item: u32) {
        self.items.push(item);
    }

    fn pop(&mut self) -> Result<u32, Fault> {
        self.items.pop().ok_or_else(|| Fault::error("stack is empty"))
    }
}

fn stack_spec() -> SpecificationType {
    let after_pop = ContextBuilder::<Stack>::new("AfterPop", || {
        let mut stack = Stack::default();
        stack.push(1);
        stack.push(2);
        Ok(stack)
    })
    .method("create", |stack| stack.pop().map(drop))
    .method("keeps_older_items", |stack| specify(&stack.items, contains_in_order([1u32])));

    SpecBuilder::new("demo::StackSpec")
        .group("unit")
        .context(
            ContextBuilder::<Stack>::with_default("EmptyStack")
                .method("is_empty", |stack| specify(&stack.items.len(), equal(0usize)))
                .method("rejects_pop", |stack| match stack.pop() {
                    Ok(item) => Err(Fault::mismatch(format!("popped {item} from an empty stack"))),
                    Err(_) => Ok(()),
                }),
        )
        .context(
            ContextBuilder::<Stack>::with_default("FullStack")
                .method("create", |stack| {
                    (1..=3).for_each(|item| stack.push(item));
                    Ok(())
                })
                .method("holds_every_item", |stack| {
                    specify(&stack.items, contains_exactly([3u32, 2, 1]))
                })
                .method("pops_last_pushed", |stack| specify(&stack.pop()?, equal(3u32)))
                .method("destroy", |stack| {
                    stack.items.clear();
                    Ok(())
                })
                .nested(after_pop),
        )
        .build()
}

#[derive(Debug, Default)]
struct Greeter {
    name: String,
    greeting: String,
}

/// Marker-driven: the strategy is declared by a capability of an ancestor.
fn greeting_spec() -> SpecificationType {
    SpecBuilder::new("demo::GreetingSpec")
        .group("unit")
        .extends(
            TypeMeta::new("demo::MarkedSpecification")
                .capability(CapabilityMeta::new("demo::Annotated").with_strategy(StrategyMarker::annotated())),
        )
        .context(
            ContextBuilder::<Greeter>::with_default("NamedGreeter")
                .marked(Marker::Context)
                .marked_method("prepare", Marker::Create, |greeter| {
                    greeter.name = "world".to_string();
                    greeter.greeting = format!("hello {}", greeter.name);
                    Ok(())
                })
                .marked_method("greets_by_name", Marker::Behavior, |greeter| {
                    specify(&greeter.greeting, equal_text("hello world"))
                })
                .marked_method("forget", Marker::Destroy, |greeter| {
                    greeter.name.clear();
                    Ok(())
                })
                .method("helper_not_a_behavior", |_| Ok(())),
        )
        .build()
}

/// No groups; runs through the default group.
fn smoke_spec() -> SpecificationType {
    SpecBuilder::new("demo::SmokeSpec")
        .annotate(Annotation::with_value(RUN_WITH, SPEC_RUNNER))
        .context(
            ContextBuilder::<String>::new("Banner", || Ok("behave".to_string()))
                .method("is_lowercase", |banner| {
                    specify(&*banner, equal_text(banner.to_lowercase()))
                }),
        )
        .build()
}

fn slow_spec() -> SpecificationType {
    SpecBuilder::new("demo::SlowSpec")
        .group("slow")
        .context(
            ContextBuilder::<Vec<u64>>::new("LargeRange", || Ok((1..=100_000).collect()))
                .method("sums_to_triangle_number", |values| {
                    let total: u64 = values.iter().sum();
                    specify(&total, equal(5_000_050_000u64))
                }),
        )
        .build()
}
