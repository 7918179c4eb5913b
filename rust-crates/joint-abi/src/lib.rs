use alloy::{
    primitives::{
        Address,
        B256,
        U256,
    },
    sol,
};

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract PassTheJoint {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

        function timeUntilYoinkable() external view returns (uint256);
        function ownerOf(uint256 tokenId) external view returns (address);
        function balanceOf(address owner) external view returns (uint256);
        function tokenOfOwnerByIndex(address owner, uint256 index) external view returns (uint256);
        function totalSupply() external view returns (uint256);
        function tokenByIndex(uint256 index) external view returns (uint256);

        function yoink() external;
        function yoinkTo(address target) external;
    }
}

/// The distinguished token passed around by `yoink`.
pub const JOINT_TOKEN_ID: U256 = U256::ZERO;

/// Topic encoding of an indexed `uint256` event argument.
pub fn token_topic(token_id: U256) -> B256 {
    B256::from(token_id)
}

/// Topic encoding of an indexed `address` event argument.
pub fn address_topic(address: Address) -> B256 {
    address.into_word()
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use alloy::{
        primitives::{
            address,
            b256,
        },
        sol_types::{
            SolCall,
            SolEvent,
        },
    };

    #[test]
    fn selectors__match_erc721_enumerable() {
        assert_eq!(PassTheJoint::ownerOfCall::SELECTOR, [0x63, 0x52, 0x21, 0x1e]);
        assert_eq!(PassTheJoint::balanceOfCall::SELECTOR, [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(PassTheJoint::totalSupplyCall::SELECTOR, [0x18, 0x16, 0x0d, 0xdd]);
        assert_eq!(PassTheJoint::tokenByIndexCall::SELECTOR, [0x4f, 0x6c, 0xcc, 0xe7]);
        assert_eq!(
            PassTheJoint::tokenOfOwnerByIndexCall::SELECTOR,
            [0x2f, 0x74, 0x5c, 0x59]
        );
    }

    #[test]
    fn transfer_event__uses_erc721_signature() {
        assert_eq!(
            PassTheJoint::Transfer::SIGNATURE_HASH,
            b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef")
        );
    }

    #[test]
    fn token_topic__left_pads_token_id() {
        let topic = token_topic(U256::from(7u64));
        let mut expected = [0u8; 32];
        expected[31] = 7;
        assert_eq!(topic, B256::from(expected));
        assert_eq!(token_topic(JOINT_TOKEN_ID), B256::ZERO);
    }

    #[test]
    fn address_topic__left_pads_address() {
        let who = address!("0x374b897AF1c0213cc2153a761A856bd80fb91c92");
        let topic = address_topic(who);
        assert_eq!(&topic[..12], &[0u8; 12]);
        assert_eq!(&topic[12..], who.as_slice());
    }
}
