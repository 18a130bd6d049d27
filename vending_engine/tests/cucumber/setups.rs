use cucumber::given;
use vending_engine::vm_types::{MachineCode, Money};

use crate::cucumber::{world::VendingSystem, VendingWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut VendingWorld) {
    let system = VendingSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "user '{word}' with a balance of {word}")]
async fn create_user(world: &mut VendingWorld, name: String, balance: Money) {
    let system = world.system();
    let id = system.pipeline.db().create_user(&name, balance).await.expect("Error creating user");
    system.users.insert(name, id);
}

#[given(expr = "product '{word}' priced at {word}")]
async fn create_product(world: &mut VendingWorld, name: String, price: Money) {
    let system = world.system();
    let id = system.pipeline.db().create_product(&name, price).await.expect("Error creating product");
    system.products.insert(name, id);
}

#[given(expr = "machine '{word}' stocks {int} of product '{word}'")]
async fn stock_machine(world: &mut VendingWorld, code: String, stock: i64, product: String) {
    let system = world.system();
    let product = system.product(&product);
    let machine = match system.machines.get(&code) {
        Some(id) => *id,
        None => {
            let machine_code = code.parse::<MachineCode>().expect("Invalid machine code");
            let id = system.pipeline.db().create_machine(&machine_code, None).await.expect("Error creating machine");
            system.machines.insert(code, id);
            id
        },
    };
    system.pipeline.db().set_stock(machine, product, stock).await.expect("Error setting stock");
}
